//! Values with a process-wide default and per-thread overrides.
//!
//! `set` shadows the value on the calling thread only. `set_global` replaces
//! the default for every thread and drops every thread's override, including
//! threads that have not started yet.
//!
//! Overrides live in the setting itself, keyed by thread, so they are freed
//! together with the setting.

use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::RwLock;

/// A setting overridable per calling thread.
pub struct ThreadSetting<T> {
    global: RwLock<T>,
    overrides: DashMap<ThreadId, T>,
}

impl<T: Clone> ThreadSetting<T> {
    pub fn new(initial: T) -> Self {
        Self {
            global: RwLock::new(initial),
            overrides: DashMap::new(),
        }
    }

    /// The value seen by the calling thread.
    pub fn get(&self) -> T {
        if let Some(local) = self.overrides.get(&thread::current().id()) {
            return local.value().clone();
        }
        self.global.read().clone()
    }

    /// Override the value on the calling thread.
    pub fn set(&self, value: T) {
        self.overrides.insert(thread::current().id(), value);
    }

    /// Replace the value for every thread.
    pub fn set_global(&self, value: T) {
        let mut global = self.global.write();
        *global = value;
        // Cleared under the write lock so no reader pairs a stale override
        // with the new default.
        self.overrides.clear();
    }

    /// Drop the calling thread's override.
    pub fn clear(&self) {
        self.overrides.remove(&thread::current().id());
    }

    #[cfg(test)]
    fn override_count(&self) -> usize {
        self.overrides.len()
    }
}
