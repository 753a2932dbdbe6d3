//! REST terminus.
//!
//! # Responsibilities
//! - Map indirection operations onto HTTP verbs and paths
//! - Negotiate formats (`Accept`, `Content-Type`) and compression
//! - Turn responses into instances, "not found" results or typed errors
//! - Resolve the server and port for every call
//!
//! # Design Decisions
//! - One call, one round trip: failover is layered outside (see `resilience`)
//! - A 404 is a normal "not found" unless the request asks to fail on it
//! - PUT and DELETE carry no options; the wire has no channel for them
//! - Over-long GET URLs are sent as POST with a form body
//!
//! # Data Flow
//! ```text
//! Request
//!     → path: <prefix>/<version>/<indirection>[s]/<escaped key>
//!     → query: environment=<env>&<options>
//!     → Network::send
//!     → version check → decompress → status dispatch → convert_from
//! ```

pub mod network;

pub use network::{HttpRequest, HttpResponse, Network, ReqwestNetwork};

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE,
};
use reqwest::{Method as HttpMethod, StatusCode};

use crate::config;
use crate::error::{IndirectorError, Result};
use crate::http::protocol::{self, ErrorBody, VERSION_HEADER};
use crate::model::{accept_header, Model};
use crate::observability::{logging, metrics, warnings};
use crate::request::{OptionValue, Options, Request};
use crate::resilience::failover::{self, Endpoint};
use crate::terminus::{self, Terminus, TerminusDescriptor};

/// Type name `rest` termini register under.
pub const TERMINUS_TYPE: &str = "rest";

/// Option values longer than this are elided in 404 error paths.
const ELIDE_AFTER: usize = 100;

const FORM_MIME: &str = "application/x-www-form-urlencoded";

/// Talks to a remote indirector server.
pub struct Rest<M> {
    descriptor: TerminusDescriptor,
    family: Option<String>,
    network: Arc<dyn Network>,
    _model: PhantomData<fn() -> M>,
}

/// Register a REST terminus for an indirection.
///
/// `family` names a `families` settings entry whose server/port beat every
/// other source.
pub fn register<M: Model>(
    indirection: &str,
    family: Option<&str>,
    network: Arc<dyn Network>,
) -> Result<()> {
    let family = family.map(str::to_string);
    terminus::register::<M, _>(indirection, TERMINUS_TYPE, move |descriptor| {
        let mut rest = Rest::<M>::new(descriptor, Arc::clone(&network));
        if let Some(family) = &family {
            rest = rest.with_family(family.clone());
        }
        Ok(Arc::new(rest) as Arc<dyn Terminus<M>>)
    })
}

impl<M: Model> Rest<M> {
    pub fn new(descriptor: TerminusDescriptor, network: Arc<dyn Network>) -> Self {
        Self {
            descriptor,
            family: None,
            network,
            _model: PhantomData,
        }
    }

    /// Use the server/port settings of a terminus family (e.g. `ca`).
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    /// Server and port from settings.
    ///
    /// Highest priority first: family setting, failover override, first
    /// server list entry, default server and port.
    pub fn endpoint(&self) -> Endpoint {
        let settings = config::current();
        let family = self
            .family
            .as_ref()
            .and_then(|name| settings.families.get(name));
        let failover = failover::current();
        let listed = settings.server_list.first();

        let host = family
            .and_then(|f| f.server.clone())
            .or_else(|| failover.as_ref().map(|e| e.host.clone()))
            .or_else(|| listed.map(|e| e.host.clone()))
            .unwrap_or_else(|| settings.server.clone());
        let port = family
            .and_then(|f| f.port)
            .or_else(|| failover.as_ref().map(|e| e.port))
            .or_else(|| listed.map(|e| e.port.unwrap_or(settings.port)))
            .unwrap_or(settings.port);

        Endpoint::new(host, port)
    }

    /// Headers sent with every request.
    pub fn headers(&self) -> HeaderMap {
        let settings = config::current();
        let mut headers = HeaderMap::new();
        if let Ok(accept) = HeaderValue::from_str(&accept_header(&M::supported_formats())) {
            headers.insert(ACCEPT, accept);
        }
        headers.insert(VERSION_HEADER, HeaderValue::from_static(protocol::version()));
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static(protocol::accept_encoding(&settings)),
        );
        headers
    }

    /// `<scheme>://<server>:<port>`; a server or port in the request key wins.
    fn base_url(&self, request: &Request<M>) -> String {
        let resolved = self.endpoint();
        let host = request.server().unwrap_or(&resolved.host);
        let port = request.port().unwrap_or(resolved.port);
        let scheme = config::current().http.scheme.clone();
        if host.contains(':') && !host.starts_with('[') {
            format!("{}://[{}]:{}", scheme, host, port)
        } else {
            format!("{}://{}:{}", scheme, host, port)
        }
    }

    fn path(&self, request: &Request<M>) -> String {
        let settings = config::current();
        format!(
            "{}/{}/{}{}/{}",
            settings.http.url_prefix.trim_end_matches('/'),
            settings.http.api_version,
            request.indirection_name(),
            if request.is_plural() { "s" } else { "" },
            request.escaped_key()
        )
    }

    fn query(&self, request: &Request<M>, options: &Options) -> Result<String> {
        Ok(format!(
            "environment={}&{}",
            request.environment().name(),
            options.query_string()?
        ))
    }

    /// Path and query as shown in 404 errors.
    fn display_path(&self, request: &Request<M>) -> Result<String> {
        let query = if logging::verbose() {
            self.query(request, request.options())?
        } else {
            self.query(request, &elided(request.options()))?
        };
        Ok(format!("{}?{}", self.path(request), query))
    }

    fn reject_options(&self, request: &Request<M>, verb: &str) -> Result<()> {
        if request.options().is_empty() {
            Ok(())
        } else {
            Err(IndirectorError::Argument(format!(
                "{} does not accept options",
                verb
            )))
        }
    }

    /// GET with the query in the URL, or POST with it in the body when too long.
    fn get(&self, request: &Request<M>) -> Result<HttpResponse> {
        let base = self.base_url(request);
        let path = self.path(request);
        let query = self.query(request, request.options())?;
        let url = format!("{}{}?{}", base, path, query);

        let max = config::current().http.max_get_url_length;
        let http = if url.len() > max {
            tracing::debug!(length = url.len(), max, "URL too long; sending the query as a POST body");
            let mut headers = self.headers();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_MIME));
            HttpRequest {
                method: HttpMethod::POST,
                url: format!("{}{}", base, path),
                headers,
                body: Some(query.into_bytes()),
            }
        } else {
            HttpRequest {
                method: HttpMethod::GET,
                url,
                headers: self.headers(),
                body: None,
            }
        };
        self.execute(http)
    }

    fn execute(&self, http: HttpRequest) -> Result<HttpResponse> {
        warnings::deprecation_warning(
            "rest-terminus",
            "Accessing indirections through the REST terminus is deprecated; use a direct HTTP client instead",
        );

        tracing::debug!(method = %http.method, url = %http.url, "Sending request");
        let start = Instant::now();
        let mut response = self.network.send(http)?;
        metrics::record_http_response(&self.descriptor.indirection, response.status.as_u16(), start);

        protocol::accommodate_peer(&response.headers);

        let encoding = response.header(CONTENT_ENCODING.as_str()).map(str::to_string);
        let body = std::mem::take(&mut response.body);
        response.body = protocol::decompress(encoding.as_deref(), body)?;
        Ok(response)
    }

    /// `Ok(true)` for 2xx, `Ok(false)` for an ignorable 404, otherwise the error.
    fn check(&self, request: &Request<M>, response: &HttpResponse) -> Result<bool> {
        if response.status.is_success() {
            return Ok(true);
        }
        if response.status == StatusCode::NOT_FOUND {
            if request.fail_on_404() {
                return Err(IndirectorError::NotFound {
                    method: capitalize(request.method().as_str()),
                    path: self.display_path(request)?,
                    message: response.body_text(),
                });
            }
            return Ok(false);
        }
        Err(http_error(response))
    }

    fn convert_one(&self, response: &HttpResponse) -> Result<M> {
        M::convert_from(content_mime(response)?, &response.body)
    }
}

impl<M: Model> Terminus<M> for Rest<M> {
    fn descriptor(&self) -> &TerminusDescriptor {
        &self.descriptor
    }

    fn find(&self, request: &Request<M>) -> Result<Option<M>> {
        let response = self.get(request)?;
        if !self.check(request, &response)? {
            return Ok(None);
        }
        let mut instance = self.convert_one(&response)?;
        instance.set_name(request.key());
        Ok(Some(instance))
    }

    fn head(&self, request: &Request<M>) -> Result<bool> {
        let url = format!(
            "{}{}?{}",
            self.base_url(request),
            self.path(request),
            self.query(request, request.options())?
        );
        let response = self.execute(HttpRequest {
            method: HttpMethod::HEAD,
            url,
            headers: self.headers(),
            body: None,
        })?;
        self.check(request, &response)
    }

    fn search(&self, request: &Request<M>) -> Result<Vec<M>> {
        let response = self.get(request)?;
        if !self.check(request, &response)? {
            return Ok(Vec::new());
        }
        M::convert_from_multiple(content_mime(&response)?, &response.body)
    }

    fn save(&self, request: &Request<M>) -> Result<Option<M>> {
        self.reject_options(request, "PUT")?;
        let instance = request.instance().ok_or_else(|| {
            IndirectorError::Argument(format!("Nothing to save for {}", request.key()))
        })?;

        let format = M::default_format();
        let body = instance.render(format)?;
        let mut headers = self.headers();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.mime));

        let url = format!(
            "{}{}?{}",
            self.base_url(request),
            self.path(request),
            self.query(request, &Options::new())?
        );
        let response = self.execute(HttpRequest {
            method: HttpMethod::PUT,
            url,
            headers,
            body: Some(body),
        })?;
        if !self.check(request, &response)? {
            return Ok(None);
        }
        self.convert_one(&response).map(Some)
    }

    fn destroy(&self, request: &Request<M>) -> Result<Option<M>> {
        self.reject_options(request, "DELETE")?;

        let url = format!(
            "{}{}?{}",
            self.base_url(request),
            self.path(request),
            self.query(request, &Options::new())?
        );
        let response = self.execute(HttpRequest {
            method: HttpMethod::DELETE,
            url,
            headers: self.headers(),
            body: None,
        })?;
        if !self.check(request, &response)? {
            return Ok(None);
        }
        self.convert_one(&response).map(Some)
    }
}

fn content_mime(response: &HttpResponse) -> Result<&str> {
    response.mime_type().ok_or_else(|| {
        IndirectorError::Deserialization("No content type in http response; cannot parse".to_string())
    })
}

/// Error for a non-2xx response that is not an ignorable 404.
fn http_error(response: &HttpResponse) -> IndirectorError {
    let code = response.status.as_u16();

    if response.mime_type() == Some(protocol::ERROR_MIME) {
        if let Ok(body) = serde_json::from_slice::<ErrorBody>(&response.body) {
            return IndirectorError::Http {
                code,
                message: body.message,
                issue_kind: body.issue_kind,
            };
        }
    }

    let text = response.body_text();
    let message = if text.is_empty() {
        response.status.canonical_reason().unwrap_or_default().to_string()
    } else {
        text
    };
    IndirectorError::Http {
        code,
        message,
        issue_kind: None,
    }
}

/// Options with long string values cut to `ELIDE_AFTER` characters plus `...`.
fn elided(options: &Options) -> Options {
    fn elide(value: &OptionValue) -> OptionValue {
        match value {
            OptionValue::Str(s) if s.chars().count() > ELIDE_AFTER => {
                OptionValue::Str(format!("{}...", s.chars().take(ELIDE_AFTER).collect::<String>()))
            }
            OptionValue::List(items) => OptionValue::List(items.iter().map(elide).collect()),
            other => other.clone(),
        }
    }
    options.iter().map(|(k, v)| (k.clone(), elide(v))).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
