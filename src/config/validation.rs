//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports valid, timeouts > 0)
//! - Check that named formats and versions parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>
//! - Runs before settings are installed

use std::fmt;

use crate::config::schema::Settings;
use crate::model::Format;

/// One semantic problem found in a settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check settings for semantic problems.
pub fn validate_config(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.server.trim().is_empty() {
        errors.push(ValidationError::new("server", "must not be empty"));
    }
    if settings.port == 0 {
        errors.push(ValidationError::new("port", "must be between 1 and 65535"));
    }

    for (i, entry) in settings.server_list.iter().enumerate() {
        if entry.host.trim().is_empty() {
            errors.push(ValidationError::new(
                &format!("server_list[{}].host", i),
                "must not be empty",
            ));
        }
        if entry.port == Some(0) {
            errors.push(ValidationError::new(
                &format!("server_list[{}].port", i),
                "must be between 1 and 65535",
            ));
        }
    }

    for (family, endpoint) in &settings.families {
        if endpoint.port == Some(0) {
            errors.push(ValidationError::new(
                &format!("families.{}.port", family),
                "must be between 1 and 65535",
            ));
        }
    }

    if Format::by_name(&settings.preferred_serialization_format).is_none() {
        errors.push(ValidationError::new(
            "preferred_serialization_format",
            format!("unknown format '{}'", settings.preferred_serialization_format),
        ));
    }
    if Format::by_name(&settings.protocol.compatible_format).is_none() {
        errors.push(ValidationError::new(
            "protocol.compatible_format",
            format!("unknown format '{}'", settings.protocol.compatible_format),
        ));
    }
    if semver::Version::parse(&settings.protocol.min_peer_version).is_err() {
        errors.push(ValidationError::new(
            "protocol.min_peer_version",
            format!("'{}' is not a semantic version", settings.protocol.min_peer_version),
        ));
    }

    if !settings.http.url_prefix.starts_with('/') {
        errors.push(ValidationError::new("http.url_prefix", "must start with '/'"));
    }
    if settings.http.api_version.trim().is_empty() {
        errors.push(ValidationError::new("http.api_version", "must not be empty"));
    }
    if settings.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
