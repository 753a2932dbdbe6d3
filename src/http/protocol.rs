//! Wire protocol pieces shared by the REST terminus and the server.
//!
//! # Responsibilities
//! - Version header sent on every request and response
//! - `Accept-Encoding` contribution and response body decompression
//! - Structured error bodies
//! - Peer-version accommodation (serialization downgrade)
//!
//! # Design Decisions
//! - Downgrade thresholds come from settings, not a hard-coded table
//! - A missing or unparseable peer version never triggers a downgrade

use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};
use reqwest::header::HeaderMap;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::config::{self, Settings};
use crate::error::{IndirectorError, Result};
use crate::observability::warnings;

/// Header carrying the sender's version.
pub const VERSION_HEADER: &str = "x-indirector-version";

/// Mime type of structured error bodies.
pub const ERROR_MIME: &str = "application/json";

/// Wire protocol version this build speaks.
///
/// Independent of the crate version; bump it only when the wire format
/// changes.
pub const PROTOCOL_VERSION: &str = "5.0.0";

/// The version sent in [`VERSION_HEADER`].
pub fn version() -> &'static str {
    PROTOCOL_VERSION
}

/// `Accept-Encoding` value for the current settings.
pub fn accept_encoding(settings: &Settings) -> &'static str {
    if settings.http.compression {
        "gzip, deflate"
    } else {
        "identity"
    }
}

/// Decode a body according to its `Content-Encoding`.
///
/// Unknown or absent encodings leave the body untouched.
pub fn decompress(encoding: Option<&str>, body: Vec<u8>) -> Result<Vec<u8>> {
    let encoding = encoding.map(|e| e.trim().to_ascii_lowercase());
    let mut out = Vec::new();
    match encoding.as_deref() {
        Some("gzip") | Some("x-gzip") => {
            GzDecoder::new(body.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| IndirectorError::Deserialization(format!("Invalid gzip body: {}", e)))?;
            Ok(out)
        }
        Some("deflate") => {
            ZlibDecoder::new(body.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| IndirectorError::Deserialization(format!("Invalid deflate body: {}", e)))?;
            Ok(out)
        }
        _ => Ok(body),
    }
}

/// A structured error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_kind: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, issue_kind: Option<&str>) -> Self {
        Self {
            message: message.into(),
            issue_kind: issue_kind.map(str::to_string),
        }
    }
}

/// Issue kind reported for each error class.
pub fn issue_kind(error: &IndirectorError) -> &'static str {
    match error {
        IndirectorError::Configuration(_) => "CONFIGURATION",
        IndirectorError::Argument(_) => "ARGUMENT",
        IndirectorError::Authorization { .. } => "NOT_AUTHORIZED",
        IndirectorError::Validation(_) => "VALIDATION",
        IndirectorError::Unsupported { .. } => "METHOD_NOT_ALLOWED",
        IndirectorError::NotFound { .. } => "RESOURCE_NOT_FOUND",
        IndirectorError::Deserialization(_) | IndirectorError::Json(_) => "MALFORMED_BODY",
        IndirectorError::Http { .. } | IndirectorError::Network(_) | IndirectorError::Io(_) => {
            "RUNTIME_ERROR"
        }
    }
}

/// Parse a version leniently: `4` and `4.10` read as `4.0.0` and `4.10.0`.
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() || parts.len() > 2 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    let padded = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        _ => format!("{}.{}.0", parts[0], parts[1]),
    };
    Version::parse(&padded).ok()
}

/// Downgrade the preferred format when the peer is too old to read it.
///
/// Returns true if a downgrade happened.
pub fn accommodate_peer(headers: &HeaderMap) -> bool {
    let Some(raw) = headers.get(VERSION_HEADER).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let settings = config::current();
    let compatible = settings.protocol.compatible_format.clone();
    if settings.preferred_serialization_format == compatible {
        return false;
    }

    let (Some(peer), Some(minimum)) = (
        parse_version(raw),
        parse_version(&settings.protocol.min_peer_version),
    ) else {
        tracing::debug!(peer_version = %raw, "Ignoring unparseable peer version");
        return false;
    };
    if peer >= minimum {
        return false;
    }

    let format = compatible.clone();
    config::update(move |s| s.preferred_serialization_format = format.clone());
    warnings::warn_once(
        "protocol",
        &format!("downgrade-{}", compatible),
        &format!(
            "Downgrading to {} for future requests; peer version {} is older than {}",
            compatible, raw, settings.protocol.min_peer_version
        ),
    );
    true
}
