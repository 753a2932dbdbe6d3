//! Model contract.
//!
//! Anything stored through an indirection implements [`Model`]: it knows its
//! own name, which formats it can be rendered in, and how to rebuild itself
//! from a response body.

pub mod document;
pub mod format;

pub use document::Document;
pub use format::{accept_header, mime_type, Format};

use crate::config;
use crate::envelope::Envelope;
use crate::error::Result;

/// A type that can be routed through an indirection.
pub trait Model: Envelope + Clone + Send + Sync + 'static {
    /// Key the instance is saved under.
    fn name(&self) -> String;

    /// Rename a decoded instance after the key it was fetched under.
    /// Models without a settable name ignore this.
    fn set_name(&mut self, _name: &str) {}

    /// Formats the model can be rendered in and parsed from.
    fn supported_formats() -> Vec<Format>;

    /// The preferred serialization format when supported, else the first supported one.
    fn default_format() -> Format {
        let preferred = config::current().preferred_serialization_format.clone();
        let supported = Self::supported_formats();
        supported
            .iter()
            .copied()
            .find(|f| f.name == preferred)
            .or_else(|| supported.first().copied())
            .unwrap_or(Format::JSON)
    }

    /// Serialize the instance in the given format.
    fn render(&self, format: Format) -> Result<Vec<u8>>;

    /// Build one instance from a body of the given mime type.
    fn convert_from(mime: &str, body: &[u8]) -> Result<Self>;

    /// Build a list of instances from a body of the given mime type.
    fn convert_from_multiple(mime: &str, body: &[u8]) -> Result<Vec<Self>>;
}
