//! Process-wide settings storage.
//!
//! Settings are read on every call and written only at start-up, on reload,
//! or when the protocol layer downgrades the preferred format. Reads go
//! through an `ArcSwap` so they never block a concurrent reload.
//!
//! A thread can shadow the global value with [`override_for_thread`]; the
//! returned guard restores the previous value on drop.

use std::cell::RefCell;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use crate::config::schema::Settings;

static GLOBAL: OnceLock<ArcSwap<Settings>> = OnceLock::new();

thread_local! {
    static THREAD_OVERRIDE: RefCell<Option<Arc<Settings>>> = const { RefCell::new(None) };
}

fn global() -> &'static ArcSwap<Settings> {
    GLOBAL.get_or_init(|| ArcSwap::from_pointee(Settings::default()))
}

/// Settings visible to the calling thread.
pub fn current() -> Arc<Settings> {
    THREAD_OVERRIDE
        .with(|cell| cell.borrow().clone())
        .unwrap_or_else(|| global().load_full())
}

/// Atomically replace the process-wide settings.
pub fn install(settings: Settings) {
    global().store(Arc::new(settings));
    tracing::debug!("Settings installed");
}

/// Mutate the settings the calling thread sees.
///
/// A thread with an override only changes its override; otherwise the
/// process-wide settings are updated.
pub fn update<F>(f: F)
where
    F: Fn(&mut Settings),
{
    let shadowed = THREAD_OVERRIDE.with(|cell| match cell.borrow_mut().as_mut() {
        Some(settings) => {
            f(Arc::make_mut(settings));
            true
        }
        None => false,
    });
    if shadowed {
        return;
    }
    global().rcu(|current| {
        let mut next = Settings::clone(current);
        f(&mut next);
        next
    });
}

/// Restores the previous thread override when dropped.
#[must_use = "the override is removed when the guard is dropped"]
pub struct SettingsGuard {
    prev: Option<Arc<Settings>>,
}

impl Drop for SettingsGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        THREAD_OVERRIDE.with(|cell| {
            cell.replace(prev);
        });
    }
}

/// Shadow the global settings on the calling thread only.
pub fn override_for_thread(settings: Settings) -> SettingsGuard {
    let prev = THREAD_OVERRIDE.with(|cell| cell.replace(Some(Arc::new(settings))));
    SettingsGuard { prev }
}
