//! Settings file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::Settings;
use crate::config::store;
use crate::indirection;

/// A watcher that monitors the settings file for changes.
///
/// Each successful reload installs the new settings process-wide and drops
/// every memoized terminus so the next call picks up the new values.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<Arc<Settings>>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver that sees every installed reload.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<Arc<Settings>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Settings file change detected, reloading...");
                        reload(&path, &tx);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Settings watcher started");
        Ok(watcher)
    }
}

fn reload(path: &Path, tx: &mpsc::UnboundedSender<Arc<Settings>>) {
    match load_config(path) {
        Ok(settings) => {
            store::install(settings);
            let cleared = indirection::clear_all_memoized();
            tracing::info!(indirections = cleared, "Settings reloaded; memoized termini cleared");
            let _ = tx.send(store::current());
        }
        Err(e) => {
            tracing::error!("Failed to reload settings: {}. Keeping current settings.", e);
        }
    }
}
