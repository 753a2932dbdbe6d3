//! Normalized description of one indirection call.
//!
//! # Responsibilities
//! - Validate the method and require a key (or an instance to take it from)
//! - Promote recognized options to accessors; keep the rest verbatim
//! - Split absolute URI keys into protocol, server, port and a decoded key
//!
//! # Design Decisions
//! - Built fresh for every call and never mutated afterwards
//! - `file://` keys short-circuit to the decoded filesystem path
//! - Relative and authority-less keys are left exactly as given

mod environment;
mod options;

pub use environment::Environment;
pub use options::{OptionValue, Options};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::config;
use crate::error::{IndirectorError, Result};
use crate::indirection::Indirection;
use crate::model::Model;

/// Scheme whose URIs default to the configured server port.
pub const NATIVE_SCHEME: &str = "indirector";

/// Characters escaped in a key placed in a URL path.
const KEY_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Options promoted to request attributes and removed from the pass-through map.
const PROMOTED: [&str; 7] = [
    "node",
    "ip",
    "authenticated",
    "environment",
    "ignore_cache",
    "ignore_cache_save",
    "ignore_terminus",
];

/// The operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Find,
    Head,
    Search,
    Save,
    Destroy,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Find,
        Method::Head,
        Method::Search,
        Method::Save,
        Method::Destroy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Find => "find",
            Method::Head => "head",
            Method::Search => "search",
            Method::Save => "save",
            Method::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = IndirectorError;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                IndirectorError::Argument(format!(
                    "Invalid method '{}'; must be one of find, head, search, save, destroy",
                    s
                ))
            })
    }
}

/// One call into an indirection.
#[derive(Debug, Clone)]
pub struct Request<M> {
    indirection_name: String,
    method: Method,
    key: String,
    instance: Option<M>,
    options: Options,
    node: Option<String>,
    ip: Option<String>,
    authenticated: bool,
    environment: Environment,
    ignore_cache: bool,
    ignore_cache_save: bool,
    ignore_terminus: bool,
    fail_on_404: bool,
    uri: Option<String>,
    protocol: Option<String>,
    server: Option<String>,
    port: Option<u16>,
}

impl<M: Model> Request<M> {
    /// Build a request.
    ///
    /// The key defaults to the instance's name; `save` requires an instance.
    pub fn new(
        indirection_name: impl Into<String>,
        method: Method,
        key: Option<&str>,
        instance: Option<M>,
        options: Options,
    ) -> Result<Self> {
        let indirection_name = indirection_name.into();
        if indirection_name.is_empty() {
            return Err(IndirectorError::Argument(
                "Request requires an indirection name".to_string(),
            ));
        }

        let key = match (key, &instance) {
            (Some(key), _) => key.to_string(),
            (None, Some(instance)) => instance.name(),
            (None, None) => {
                return Err(IndirectorError::Argument(format!(
                    "{} request on {} requires a key",
                    method, indirection_name
                )))
            }
        };

        if method == Method::Save && instance.is_none() {
            return Err(IndirectorError::Argument(format!(
                "save request on {} requires an instance",
                indirection_name
            )));
        }

        let mut options = options;
        let promoted: Vec<(&str, OptionValue)> = PROMOTED
            .iter()
            .filter_map(|name| options.remove(name).map(|v| (*name, v)))
            .collect();

        let mut request = Self {
            indirection_name,
            method,
            key,
            instance,
            fail_on_404: options.get("fail_on_404").is_some_and(OptionValue::is_truthy),
            options,
            node: None,
            ip: None,
            authenticated: false,
            environment: Environment::current()?,
            ignore_cache: false,
            ignore_cache_save: false,
            ignore_terminus: false,
            uri: None,
            protocol: None,
            server: None,
            port: None,
        };

        for (name, value) in promoted {
            match name {
                "node" => request.node = value.as_text(),
                "ip" => request.ip = value.as_text(),
                "authenticated" => request.authenticated = value.is_truthy(),
                "environment" => {
                    if let Some(env) = value.as_text() {
                        request.environment = Environment::resolve(&env)?;
                    }
                }
                "ignore_cache" => request.ignore_cache = value.is_truthy(),
                "ignore_cache_save" => request.ignore_cache_save = value.is_truthy(),
                "ignore_terminus" => request.ignore_terminus = value.is_truthy(),
                _ => {}
            }
        }

        if looks_like_uri(&request.key) {
            request.set_uri_key()?;
        }

        Ok(request)
    }

    fn set_uri_key(&mut self) -> Result<()> {
        let given = self.key.clone();
        let url = Url::parse(&given).map_err(|e| {
            IndirectorError::Argument(format!("Could not understand URL {}: {}", given, e))
        })?;

        if url.scheme() == "file" {
            self.uri = Some(given);
            self.key = decode(url.path());
            return Ok(());
        }

        // Authority-less URIs stay opaque keys.
        let Some(host) = url.host_str().filter(|h| !h.is_empty()) else {
            return Ok(());
        };

        self.server = Some(host.to_string());
        self.port = match url.port_or_known_default() {
            Some(port) => Some(port),
            None if url.scheme() == NATIVE_SCHEME => Some(config::current().port),
            None => None,
        };
        self.protocol = Some(url.scheme().to_string());
        self.key = decode(url.path().trim_start_matches('/'));
        self.uri = Some(given);
        Ok(())
    }

    /// The same request for another method and payload.
    pub(crate) fn derive(&self, method: Method, instance: Option<M>) -> Self {
        let mut request = self.clone();
        request.method = method;
        request.instance = instance;
        request
    }

    /// The registered indirection this request targets.
    pub fn indirection(&self) -> Result<Arc<Indirection<M>>> {
        Indirection::<M>::instance(&self.indirection_name).ok_or_else(|| {
            IndirectorError::Argument(format!(
                "Could not find indirection '{}'",
                self.indirection_name
            ))
        })
    }
}

impl<M> Request<M> {
    pub fn indirection_name(&self) -> &str {
        &self.indirection_name
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn instance(&self) -> Option<&M> {
        self.instance.as_ref()
    }

    /// Options passed through to the terminus.
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn ignore_cache(&self) -> bool {
        self.ignore_cache
    }

    pub fn ignore_cache_save(&self) -> bool {
        self.ignore_cache_save
    }

    pub fn ignore_terminus(&self) -> bool {
        self.ignore_terminus
    }

    pub fn fail_on_404(&self) -> bool {
        self.fail_on_404
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Made on behalf of another node.
    pub fn is_remote(&self) -> bool {
        self.node.is_some() || self.ip.is_some()
    }

    pub fn is_plural(&self) -> bool {
        self.method == Method::Search
    }

    /// Key escaped for use as a URL path segment.
    pub fn escaped_key(&self) -> String {
        utf8_percent_encode(&self.key, KEY_ESCAPE).to_string()
    }

    /// The original URI, or `/<indirection>/<key>`.
    pub fn description(&self) -> String {
        match &self.uri {
            Some(uri) => uri.clone(),
            None => format!("/{}/{}", self.indirection_name, self.key),
        }
    }

    /// Pass-through options as a query string.
    pub fn query_string(&self) -> Result<String> {
        self.options.query_string()
    }

    /// Options plus promoted attributes.
    pub fn to_hash(&self) -> Options {
        let mut hash = self.options.clone();
        if let Some(node) = &self.node {
            hash.insert("node", node.as_str());
        }
        if let Some(ip) = &self.ip {
            hash.insert("ip", ip.as_str());
        }
        if self.authenticated {
            hash.insert("authenticated", true);
        }
        if self.ignore_cache {
            hash.insert("ignore_cache", true);
        }
        if self.ignore_cache_save {
            hash.insert("ignore_cache_save", true);
        }
        if self.ignore_terminus {
            hash.insert("ignore_terminus", true);
        }
        hash.insert("environment", self.environment.name());
        hash
    }
}

/// `scheme:/...` with a word-character scheme.
fn looks_like_uri(key: &str) -> bool {
    match key.split_once(":/") {
        Some((scheme, _)) => {
            !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn decode(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;
    use serde_json::json;

    fn request(method: Method, key: &str, options: Options) -> Request<Document> {
        Request::new("ind", method, Some(key), None, options).unwrap()
    }

    #[test]
    fn test_key_from_instance() {
        let doc = Document::new("mykey", json!({}));
        let req = Request::new("ind", Method::Save, None, Some(doc.clone()), Options::new()).unwrap();
        assert_eq!(req.key(), "mykey");
        assert_eq!(req.instance(), Some(&doc));
    }

    #[test]
    fn test_requires_key_and_name() {
        let err = Request::<Document>::new("ind", Method::Find, None, None, Options::new()).unwrap_err();
        assert!(err.is_argument());

        let err = Request::<Document>::new("", Method::Find, Some("k"), None, Options::new()).unwrap_err();
        assert!(err.is_argument());

        let err = Request::<Document>::new("ind", Method::Save, Some("k"), None, Options::new()).unwrap_err();
        assert!(err.is_argument());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("search".parse::<Method>().unwrap(), Method::Search);
        assert!("expire".parse::<Method>().unwrap_err().is_argument());
    }

    #[test]
    fn test_promoted_options() {
        let options = Options::new()
            .with("node", "foo.com")
            .with("ip", "192.168.0.1")
            .with("authenticated", "eh")
            .with("ignore_cache", true)
            .with("fail_on_404", true)
            .with("server", "bar");
        let req = request(Method::Find, "key", options);

        assert_eq!(req.node(), Some("foo.com"));
        assert_eq!(req.ip(), Some("192.168.0.1"));
        assert!(req.is_authenticated());
        assert!(req.ignore_cache());
        assert!(!req.ignore_terminus());
        assert!(req.fail_on_404());
        assert!(!req.options().contains("node"));
        assert!(req.options().contains("fail_on_404"));
        assert_eq!(req.options().get("server"), Some(&OptionValue::Str("bar".into())));
    }

    #[test]
    fn test_defaults() {
        let req = request(Method::Find, "key", Options::new());
        assert!(req.node().is_none());
        assert!(!req.is_authenticated());
        assert!(!req.is_remote());
        assert!(!req.ignore_cache());
        assert!(req.options().is_empty());
    }

    #[test]
    fn test_remote_and_plural() {
        assert!(request(Method::Find, "k", Options::new().with("node", "a")).is_remote());
        assert!(request(Method::Find, "k", Options::new().with("ip", "127.0.0.1")).is_remote());
        assert!(request(Method::Search, "k", Options::new()).is_plural());
        assert!(!request(Method::Find, "k", Options::new()).is_plural());
    }

    #[test]
    fn test_http_uri_key() {
        let req = request(Method::Find, "http://host:543/stuff with spaces", Options::new());
        assert_eq!(req.protocol(), Some("http"));
        assert_eq!(req.server(), Some("host"));
        assert_eq!(req.port(), Some(543));
        assert_eq!(req.key(), "stuff with spaces");
        assert_eq!(req.uri(), Some("http://host:543/stuff with spaces"));

        assert_eq!(request(Method::Find, "http://host/", Options::new()).port(), Some(80));
    }

    #[test]
    fn test_native_scheme_uses_configured_port() {
        let mut settings = config::Settings::default();
        settings.port = 321;
        let _guard = config::override_for_thread(settings);

        let req = request(Method::Find, "indirector://host/modules/foo", Options::new());
        assert_eq!(req.port(), Some(321));
        assert_eq!(req.key(), "modules/foo");
    }

    #[test]
    fn test_file_uri_key() {
        let req = request(Method::Find, "file:///my/file%20with%20spaces", Options::new());
        assert_eq!(req.key(), "/my/file with spaces");
        assert!(req.protocol().is_none());
        assert!(req.server().is_none());
        assert!(req.port().is_none());
    }

    #[test]
    fn test_relative_and_opaque_keys_are_not_uris() {
        let req = request(Method::Find, "foo/bar", Options::new());
        assert!(req.uri().is_none());
        assert_eq!(req.key(), "foo/bar");

        let req = request(Method::Find, "mailto:joe", Options::new());
        assert!(req.uri().is_none());
        assert_eq!(req.key(), "mailto:joe");
    }

    #[test]
    fn test_description() {
        assert_eq!(request(Method::Find, "key", Options::new()).description(), "/ind/key");
        assert_eq!(
            request(Method::Find, "foo://bar/baz", Options::new()).description(),
            "foo://bar/baz"
        );
    }

    #[test]
    fn test_escaped_key_round_trips_utf8() {
        let req = request(Method::Find, "my key ☃", Options::new());
        let escaped = req.escaped_key();
        assert_eq!(escaped, "my%20key%20%E2%98%83");
        assert_eq!(decode(&escaped), "my key ☃");
    }

    #[test]
    fn test_environment_option() {
        let req = request(Method::Find, "k", Options::new().with("environment", "testing"));
        assert_eq!(req.environment().name(), "testing");
        assert_eq!(req.to_hash().get("environment"), Some(&OptionValue::Str("testing".into())));

        let err = Request::<Document>::new(
            "ind",
            Method::Find,
            Some("k"),
            None,
            Options::new().with("environment", "Not Valid"),
        )
        .unwrap_err();
        assert!(err.is_argument());
    }
}
