//! HTTP wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! REST terminus (client side)
//!     → protocol.rs (version header, compression, error bodies)
//!     → server.rs (Axum, dispatch to indirections)
//!     → protocol.rs (version header, error bodies)
//!     → response back to the terminus
//! ```

pub mod protocol;
pub mod server;

pub use protocol::{ErrorBody, VERSION_HEADER};
pub use server::HttpServer;
