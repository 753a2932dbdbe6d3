//! Settings schema definitions.
//!
//! Every section derives Serde traits and defaults, so a settings file only
//! needs to name what it changes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root settings consumed by indirections and termini.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Default server for REST termini.
    pub server: String,

    /// Default port for REST termini; also the default port of `indirector://` keys.
    pub port: u16,

    /// Ordered server list; the first entry wins over `server`/`port`.
    pub server_list: Vec<ServerEntry>,

    /// Per-family overrides (e.g. `ca`) that beat every other source.
    pub families: HashMap<String, FamilyEndpoint>,

    /// Name of the current environment.
    pub environment: String,

    /// Run interval in seconds; the default TTL of every indirection.
    pub runinterval: u64,

    /// Runtime settings that an indirection's `terminus_setting` can name.
    pub termini: HashMap<String, String>,

    /// Format used to render instances sent over the wire.
    pub preferred_serialization_format: String,

    /// Warning categories that are silenced (e.g. `deprecations`).
    pub disable_warnings: Vec<String>,

    /// Wire settings for REST termini.
    pub http: HttpConfig,

    /// Peer-compatibility policy.
    pub protocol: ProtocolConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Server binary listener.
    pub listener: ListenerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 8140,
            server_list: Vec::new(),
            families: HashMap::new(),
            environment: "production".to_string(),
            runinterval: 1800,
            termini: HashMap::new(),
            preferred_serialization_format: "json".to_string(),
            disable_warnings: Vec::new(),
            http: HttpConfig::default(),
            protocol: ProtocolConfig::default(),
            observability: ObservabilityConfig::default(),
            listener: ListenerConfig::default(),
        }
    }
}

impl Settings {
    /// Whether a warning category has been silenced.
    pub fn warnings_disabled(&self, category: &str) -> bool {
        self.disable_warnings.iter().any(|c| c == category)
    }
}

/// One entry of the ordered server list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerEntry {
    pub host: String,

    /// Falls back to the default port when absent.
    #[serde(default)]
    pub port: Option<u16>,
}

/// Server/port override for one terminus family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FamilyEndpoint {
    pub server: Option<String>,
    pub port: Option<u16>,
}

/// Wire settings for REST termini.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// URL scheme used to reach servers.
    pub scheme: String,

    /// Path prefix ahead of the API version.
    pub url_prefix: String,

    /// API version segment.
    pub api_version: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Advertise gzip/deflate in `Accept-Encoding`.
    pub compression: bool,

    /// GET URLs longer than this are sent as POST with a form body.
    pub max_get_url_length: usize,

    /// Honor proxy environment variables (`HTTPS_PROXY`, `NO_PROXY`, ...).
    pub use_proxy: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            url_prefix: "/indirector".to_string(),
            api_version: "v3".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            compression: true,
            max_get_url_length: 2048,
            use_proxy: true,
        }
    }
}

/// Peer-compatibility policy.
///
/// A peer advertising a version below `min_peer_version` cannot read the
/// preferred format, so the process falls back to `compatible_format`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub compatible_format: String,
    pub min_peer_version: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            compatible_format: "pson".to_string(),
            min_peer_version: "5.0.0".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Listener configuration for the server binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8140").
    pub bind_address: String,

    /// Directory backing the served `document` indirection.
    pub data_dir: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8140".to_string(),
            data_dir: "data".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let settings: Settings = toml::from_str("server = \"primary.example.com\"").unwrap();
        assert_eq!(settings.server, "primary.example.com");
        assert_eq!(settings.port, 8140);
        assert_eq!(settings.environment, "production");
        assert_eq!(settings.http.api_version, "v3");
        assert!(settings.server_list.is_empty());
    }

    #[test]
    fn test_server_list_and_families() {
        let settings: Settings = toml::from_str(
            r#"
            server_list = [{ host = "a.example.com", port = 8141 }, { host = "b.example.com" }]
            disable_warnings = ["deprecations"]

            [families.ca]
            server = "ca.example.com"
            port = 8142

            [termini]
            catalog_terminus = "rest"
            "#,
        )
        .unwrap();

        assert_eq!(settings.server_list.len(), 2);
        assert_eq!(settings.server_list[1].port, None);
        assert_eq!(settings.families["ca"].port, Some(8142));
        assert_eq!(settings.termini["catalog_terminus"], "rest");
        assert!(settings.warnings_disabled("deprecations"));
        assert!(!settings.warnings_disabled("protocol"));
    }
}
