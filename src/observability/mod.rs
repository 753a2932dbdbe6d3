//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Indirections, termini and the server produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and histograms)
//!     → warnings.rs (one-time warnings, silenceable by category)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The library only emits; binaries install the subscriber and exporter
//! - Metrics are cheap (atomic increments) and no-ops without an exporter

pub mod logging;
pub mod metrics;
pub mod warnings;
