//! Indirector: named routers that send find/head/search/save/destroy calls
//! for one model type to interchangeable backends ("termini"), with an
//! optional read-through cache and a REST terminus for remote servers.

pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod indirection;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod request;
pub mod resilience;
pub mod terminus;

pub use config::Settings;
pub use envelope::Envelope;
pub use error::{IndirectorError, Result};
pub use http::HttpServer;
pub use indirection::{Indirection, IndirectionOptions};
pub use lifecycle::Shutdown;
pub use model::{Document, Format, Model};
pub use request::{Method, OptionValue, Options, Request};
pub use terminus::{Terminus, TerminusDescriptor};
