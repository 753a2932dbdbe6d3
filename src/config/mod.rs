//! Settings management subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → store.rs (ArcSwap, read by every indirection call)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new settings
//!     → validation.rs validates
//!     → store.rs swaps atomically
//!     → memoized termini are cleared
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal settings files
//! - Validation separates syntactic (serde) from semantic checks
//! - Threads may shadow the global settings (tests, scoped runs)

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{FamilyEndpoint, HttpConfig, ProtocolConfig, ServerEntry, Settings};
pub use store::{current, install, override_for_thread, update, SettingsGuard};
