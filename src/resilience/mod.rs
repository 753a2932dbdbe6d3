//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Caller with an ordered server list:
//!     → failover.rs (each_server: install endpoint, call indirection)
//!     → REST terminus reads the installed endpoint
//!     → On network error: next server
//! ```
//!
//! # Design Decisions
//! - Failover lives outside the terminus; one call makes one round trip
//! - Only transport failures move on; HTTP errors are real answers

pub mod failover;
