//! HTTP server exposing document indirections.
//!
//! # Responsibilities
//! - Map the wire protocol back onto registered `Document` indirections
//! - Negotiate the response format from `Accept`
//! - Reply with the version header and structured JSON errors
//! - Wire up middleware (tracing, timeout, request ID)
//!
//! # Design Decisions
//! - Indirection calls are blocking; each runs on the blocking pool
//! - Indirections are resolved per request, so ones registered after start-up are served
//! - A POST carrying a form body is a GET whose query did not fit the URL
//! - Callers are identified by peer address, which makes every call remote
//!
//! # Data Flow
//! ```text
//! <prefix>/<version>/<indirection>[s]/<key>?<query>
//!     → version check
//!     → indirection lookup (singular first, then plural)
//!     → spawn_blocking(find | head | search | save | destroy)
//!     → render in negotiated format, or ErrorBody + status
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, DefaultBodyLimit, Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::form_urlencoded;

use crate::config::Settings;
use crate::error::{IndirectorError, Result};
use crate::http::protocol::{self, ErrorBody, VERSION_HEADER};
use crate::indirection::Indirection;
use crate::model::{Document, Format, Model};
use crate::request::{OptionValue, Options};

/// Largest request body accepted on PUT and POST.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
struct AppState {
    api_version: String,
}

/// Serves registered document indirections over HTTP.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Build the server for the given settings.
    ///
    /// The URL prefix and API version are fixed for the life of the server.
    pub fn new(settings: &Settings) -> Self {
        let state = AppState {
            api_version: settings.http.api_version.clone(),
        };
        let router = Self::build_router(settings, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(settings: &Settings, state: AppState) -> Router {
        let prefix = settings.http.url_prefix.trim_end_matches('/');
        Router::new()
            .route(
                &format!("{}/{{version}}/{{indirection}}/{{*key}}", prefix),
                any(handle),
            )
            .with_state(state)
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(middleware::map_response(add_version_header))
            .layer(TimeoutLayer::new(Duration::from_secs(
                settings.http.request_timeout_secs,
            )))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(SequentialRequestId::default()))
    }

    /// The router, for serving on a listener of the caller's choosing.
    ///
    /// Handlers read the peer address, so serve it with
    /// `into_make_service_with_connect_info::<SocketAddr>()`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown signal fires.
    ///
    /// Settings reloads arriving on `updates` are logged; prefix and version
    /// changes take effect on restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut updates: mpsc::UnboundedReceiver<Arc<Settings>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::result::Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        tokio::spawn(async move {
            while let Some(settings) = updates.recv().await {
                tracing::info!(
                    environment = %settings.environment,
                    server = %settings.server,
                    "Serving with reloaded settings"
                );
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Monotonic request IDs for `x-request-id`.
#[derive(Clone, Default)]
struct SequentialRequestId {
    next: Arc<AtomicU64>,
}

impl MakeRequestId for SequentialRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        HeaderValue::from_str(&id.to_string()).ok().map(RequestId::new)
    }
}

async fn add_version_header(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(VERSION_HEADER, HeaderValue::from_static(protocol::version()));
    response
}

/// What one wire call asks of an indirection.
enum Call {
    Find(String),
    Head(String),
    Search(String),
    Save(String, Document),
    Destroy(String),
}

enum Outcome {
    One(Option<Document>),
    Many(Vec<Document>),
    Exists(bool),
}

async fn handle(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    Path((version, segment, key)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if version != state.api_version {
        return error_response(
            StatusCode::NOT_FOUND,
            ErrorBody::new(
                format!("Unsupported API version '{}'", version),
                Some("RESOURCE_NOT_FOUND"),
            ),
        );
    }

    let Some((name, plural)) = resolve(&segment) else {
        return error_response(
            StatusCode::NOT_FOUND,
            ErrorBody::new(
                format!("No indirection named '{}'", segment),
                Some("RESOURCE_NOT_FOUND"),
            ),
        );
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let format = negotiate(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()));

    // A form-encoded POST carries the query in its body.
    let query = if method == Method::POST {
        String::from_utf8_lossy(&body).into_owned()
    } else {
        query.unwrap_or_default()
    };
    let mut options = parse_query(&query);
    options.insert("ip", peer.ip().to_string());

    let reads = method == Method::GET || method == Method::POST;
    let call = if reads && plural {
        Call::Search(key)
    } else if reads {
        Call::Find(key)
    } else if method == Method::HEAD && !plural {
        Call::Head(key)
    } else if method == Method::PUT && !plural {
        match parse_instance(content_type.as_deref(), &body) {
            Ok(instance) => Call::Save(key, instance),
            Err(e) => return failure(&e),
        }
    } else if method == Method::DELETE && !plural {
        Call::Destroy(key)
    } else {
        return error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorBody::new(
                format!("{} is not supported on {}", method, segment),
                Some("METHOD_NOT_ALLOWED"),
            ),
        );
    };

    tracing::debug!(indirection = %name, method = %method, peer = %peer, "Dispatching wire call");
    let joined = tokio::task::spawn_blocking(move || dispatch(&name, call, options)).await;

    match joined {
        Ok(Ok(Outcome::One(Some(instance)))) => render_one(&instance, format),
        Ok(Ok(Outcome::One(None))) => not_found(&segment),
        Ok(Ok(Outcome::Many(instances))) => render_many(&instances, format),
        Ok(Ok(Outcome::Exists(true))) => StatusCode::OK.into_response(),
        Ok(Ok(Outcome::Exists(false))) => StatusCode::NOT_FOUND.into_response(),
        Ok(Err(e)) => failure(&e),
        Err(e) => {
            tracing::error!(error = %e, "Indirection call panicked");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("Internal error", Some("RUNTIME_ERROR")),
            )
        }
    }
}

/// Indirection name and plurality for a path segment.
fn resolve(segment: &str) -> Option<(String, bool)> {
    if Indirection::<Document>::instance(segment).is_some() {
        return Some((segment.to_string(), false));
    }
    let singular = segment.strip_suffix('s')?;
    Indirection::<Document>::instance(singular).map(|_| (singular.to_string(), true))
}

fn dispatch(name: &str, call: Call, options: Options) -> Result<Outcome> {
    let indirection = Indirection::<Document>::instance(name).ok_or_else(|| {
        IndirectorError::Configuration(format!("Indirection {} was removed", name))
    })?;
    match call {
        Call::Find(key) => indirection.find(&key, options).map(Outcome::One),
        Call::Head(key) => indirection.head(&key, options).map(Outcome::Exists),
        Call::Search(key) => indirection.search(&key, options).map(Outcome::Many),
        Call::Save(key, instance) => indirection
            .save(instance, Some(&key), options)
            .map(Outcome::One),
        Call::Destroy(key) => indirection.destroy(&key, options).map(Outcome::One),
    }
}

/// Options from a form-encoded query; repeated keys become lists.
fn parse_query(query: &str) -> Options {
    let mut options = Options::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let value = match value.as_ref() {
            "true" => OptionValue::Bool(true),
            "false" => OptionValue::Bool(false),
            _ => OptionValue::Str(value.into_owned()),
        };
        let merged = match options.remove(&key) {
            Some(OptionValue::List(mut items)) => {
                items.push(value);
                OptionValue::List(items)
            }
            Some(previous) => OptionValue::List(vec![previous, value]),
            None => value,
        };
        options.insert(key.into_owned(), merged);
    }
    options
}

fn parse_instance(content_type: Option<&str>, body: &[u8]) -> Result<Document> {
    let mime = content_type.ok_or_else(|| {
        IndirectorError::Deserialization("No content type in request; cannot parse".to_string())
    })?;
    Document::convert_from(mime, body)
}

/// First acceptable supported format, else the model default.
fn negotiate(accept: Option<&str>) -> Format {
    let supported = Document::supported_formats();
    accept
        .into_iter()
        .flat_map(|a| a.split(','))
        .filter_map(|m| Format::by_mime(m.trim()))
        .find(|f| supported.contains(f))
        .unwrap_or_else(Document::default_format)
}

fn render_one(instance: &Document, format: Format) -> Response {
    match instance.render(format) {
        Ok(body) => with_content_type(StatusCode::OK, format.mime, body),
        Err(e) => failure(&e),
    }
}

fn render_many(instances: &[Document], format: Format) -> Response {
    match serde_json::to_vec(instances) {
        Ok(body) => with_content_type(StatusCode::OK, format.mime, body),
        Err(e) => failure(&e.into()),
    }
}

fn not_found(segment: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        ErrorBody::new(
            format!("Could not find {}", segment),
            Some("RESOURCE_NOT_FOUND"),
        ),
    )
}

fn failure(error: &IndirectorError) -> Response {
    let status = status_for(error);
    if status.is_server_error() {
        tracing::error!(error = %error, "Indirection call failed");
    } else {
        tracing::debug!(error = %error, status = %status, "Indirection call rejected");
    }
    error_response(
        status,
        ErrorBody::new(error.to_string(), Some(protocol::issue_kind(error))),
    )
}

/// HTTP status reported for each error class.
fn status_for(error: &IndirectorError) -> StatusCode {
    match error {
        IndirectorError::Argument(_)
        | IndirectorError::Validation(_)
        | IndirectorError::Deserialization(_)
        | IndirectorError::Json(_) => StatusCode::BAD_REQUEST,
        IndirectorError::Authorization { .. } => StatusCode::FORBIDDEN,
        IndirectorError::Unsupported { .. } => StatusCode::METHOD_NOT_ALLOWED,
        IndirectorError::NotFound { .. } => StatusCode::NOT_FOUND,
        IndirectorError::Http { code, .. } => {
            StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        IndirectorError::Network(_) => StatusCode::BAD_GATEWAY,
        IndirectorError::Configuration(_) | IndirectorError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(status: StatusCode, body: ErrorBody) -> Response {
    match serde_json::to_vec(&body) {
        Ok(bytes) => with_content_type(status, protocol::ERROR_MIME, bytes),
        Err(_) => (status, body.message).into_response(),
    }
}

fn with_content_type(status: StatusCode, mime: &'static str, body: Vec<u8>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(mime))],
        Body::from(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let options = parse_query("environment=production&one=two&flag=true&x=1&x=2&");
        assert_eq!(options.get("one"), Some(&OptionValue::from("two")));
        assert_eq!(options.get("flag"), Some(&OptionValue::Bool(true)));
        assert_eq!(
            options.get("x"),
            Some(&OptionValue::List(vec!["1".into(), "2".into()]))
        );
        assert_eq!(options.get("environment"), Some(&OptionValue::from("production")));
    }

    #[test]
    fn test_negotiate() {
        let _guard = crate::config::override_for_thread(Settings::default());
        assert_eq!(negotiate(Some("text/pson, application/json")), Format::PSON);
        assert_eq!(negotiate(Some("text/yaml, application/json; q=0.5")), Format::JSON);
        assert_eq!(negotiate(Some("text/yaml")), Format::JSON);
        assert_eq!(negotiate(None), Format::JSON);
    }

    #[test]
    fn test_status_for() {
        assert_eq!(
            status_for(&IndirectorError::Argument("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&IndirectorError::Authorization {
                method: crate::request::Method::Find,
                key: "k".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&IndirectorError::Configuration("none".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&IndirectorError::Network("down".into())),
            StatusCode::BAD_GATEWAY
        );
    }
}
