//! Indirector server.
//!
//! Serves a `document` indirection over the wire protocol.
//!
//! # Architecture Overview
//!
//! ```text
//!     REST terminus ──▶ http::server ──▶ Indirection<Document>
//!                                            │
//!                               ┌────────────┴────────────┐
//!                               ▼                         ▼
//!                        memory cache               json terminus
//!                                                   (data_dir/document/*.json)
//! ```
//!
//! Usage: `indirector [SETTINGS.toml]`. Without a path the defaults are used
//! and nothing is watched.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use indirector::config::{self, watcher::ConfigWatcher, Settings};
use indirector::http::HttpServer;
use indirector::indirection::{Indirection, IndirectionOptions};
use indirector::lifecycle::{signals, Shutdown};
use indirector::model::Document;
use indirector::observability::{logging, metrics};
use indirector::terminus::{self, json::JsonFile, memory::Memory, Terminus};

const INDIRECTION: &str = "document";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = match &path {
        Some(path) => config::load_config(path)?,
        None => Settings::default(),
    };

    logging::init(&settings.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "indirector starting");

    config::install(settings.clone());

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    register_documents(&settings)?;

    let (updates_tx, updates) = mpsc::unbounded_channel();
    // Keep the watcher alive for the life of the server.
    let _watcher = match &path {
        Some(path) => {
            let (watcher, mut reloads) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            tokio::spawn(async move {
                while let Some(settings) = reloads.recv().await {
                    let _ = updates_tx.send(Arc::clone(&settings));
                }
            });
            Some(watcher)
        }
        None => None,
    };

    let listener = TcpListener::bind(&settings.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        data_dir = %settings.listener.data_dir,
        "Listening for connections"
    );

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        signals::shutdown_on_signal(&signal_shutdown).await;
    });

    HttpServer::new(&settings)
        .run(listener, updates, server_shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Register the served indirection: JSON files behind a memory cache.
fn register_documents(settings: &Settings) -> indirector::Result<()> {
    Indirection::<Document>::register(
        INDIRECTION,
        IndirectionOptions::default()
            .terminus_class(terminus::json::TERMINUS_TYPE)
            .cache_class(terminus::memory::TERMINUS_TYPE)
            .doc("Arbitrary JSON documents stored by name"),
    )?;

    let data_dir = PathBuf::from(&settings.listener.data_dir);
    terminus::register::<Document, _>(INDIRECTION, terminus::json::TERMINUS_TYPE, move |d| {
        Ok(Arc::new(JsonFile::<Document>::new(d, &data_dir)) as Arc<dyn Terminus<Document>>)
    })?;
    terminus::register::<Document, _>(INDIRECTION, terminus::memory::TERMINUS_TYPE, |d| {
        Ok(Arc::new(Memory::<Document>::new(d)) as Arc<dyn Terminus<Document>>)
    })?;
    Ok(())
}
