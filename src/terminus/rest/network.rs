//! HTTP transport used by REST termini.
//!
//! The terminus only ever sees [`Network`]; the default implementation is a
//! blocking `reqwest` client, and tests substitute a scripted one.

use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, StatusCode};

use crate::config::HttpConfig;
use crate::error::{IndirectorError, Result};
use crate::model::mime_type;

/// One outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// A received response, body not yet decompressed.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The mime-type portion of `Content-Type`, if present and non-empty.
    pub fn mime_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(mime_type)
            .filter(|m| !m.is_empty())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one request and returns the response.
///
/// Implementations return `IndirectorError::Network` when no response arrives.
pub trait Network: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Blocking `reqwest` transport.
///
/// Must not be driven from inside an async runtime thread.
pub struct ReqwestNetwork {
    client: reqwest::blocking::Client,
}

impl ReqwestNetwork {
    pub fn new(http: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .timeout(Duration::from_secs(http.request_timeout_secs));
        if !http.use_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| IndirectorError::Configuration(format!("Invalid HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Network for ReqwestNetwork {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(|e| {
            IndirectorError::Network(format!("{} {}: {}", request.method, request.url, e))
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .map_err(|e| IndirectorError::Network(format!("Failed reading response body: {}", e)))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
