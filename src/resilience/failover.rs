//! Client-side server failover.
//!
//! # Responsibilities
//! - Hold the endpoint override consulted by REST termini on this thread
//! - Walk an ordered server list until one answers
//!
//! # Design Decisions
//! - The override is thread-local and restored when the call returns
//! - Family-specific server settings still beat the override

use std::cell::RefCell;
use std::fmt;

use crate::config::{self, ServerEntry};
use crate::error::{IndirectorError, Result};

/// A server to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint for a server list entry; the port defaults to `default_port`.
    pub fn from_entry(entry: &ServerEntry, default_port: u16) -> Self {
        Self::new(entry.host.clone(), entry.port.unwrap_or(default_port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Endpoint>> = const { RefCell::new(None) };
}

/// The endpoint installed on the calling thread, if any.
pub fn current() -> Option<Endpoint> {
    CURRENT.with(|cell| cell.borrow().clone())
}

struct Restore(Option<Endpoint>);

impl Drop for Restore {
    fn drop(&mut self) {
        let prev = self.0.take();
        CURRENT.with(|cell| {
            cell.replace(prev);
        });
    }
}

/// Run `f` with `endpoint` installed as the failover override.
pub fn with_endpoint<T, F>(endpoint: Endpoint, f: F) -> T
where
    F: FnOnce() -> T,
{
    let prev = CURRENT.with(|cell| cell.replace(Some(endpoint)));
    let _restore = Restore(prev);
    f()
}

/// Try `f` against each server in order.
///
/// Moves on only when `f` fails with a network error. Returns the first
/// other result, or the last network error when every server failed.
pub fn each_server<T, F>(servers: &[ServerEntry], mut f: F) -> Result<T>
where
    F: FnMut(&Endpoint) -> Result<T>,
{
    let default_port = config::current().port;
    let mut last_error = None;

    for (i, entry) in servers.iter().enumerate() {
        let endpoint = Endpoint::from_entry(entry, default_port);
        match with_endpoint(endpoint.clone(), || f(&endpoint)) {
            Err(e) if e.is_network() => {
                tracing::warn!(
                    server_idx = i,
                    server = %endpoint,
                    error = %e,
                    "Server unreachable, trying next server"
                );
                last_error = Some(e);
            }
            other => return other,
        }
    }

    Err(last_error.unwrap_or_else(|| {
        IndirectorError::Configuration("No servers configured for failover".to_string())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(hosts: &[&str]) -> Vec<ServerEntry> {
        hosts
            .iter()
            .map(|h| ServerEntry {
                host: h.to_string(),
                port: Some(9000),
            })
            .collect()
    }

    #[test]
    fn test_with_endpoint_is_scoped() {
        assert!(current().is_none());
        let seen = with_endpoint(Endpoint::new("a", 1), || {
            with_endpoint(Endpoint::new("b", 2), current);
            current()
        });
        assert_eq!(seen, Some(Endpoint::new("a", 1)));
        assert!(current().is_none());
    }

    #[test]
    fn test_each_server_skips_network_failures() {
        let mut tried = Vec::new();
        let result = each_server(&entries(&["down", "up", "never"]), |endpoint| {
            tried.push(endpoint.host.clone());
            assert_eq!(current().as_ref(), Some(endpoint));
            if endpoint.host == "down" {
                Err(IndirectorError::Network("connection refused".to_string()))
            } else {
                Ok(endpoint.port)
            }
        });
        assert_eq!(result.unwrap(), 9000);
        assert_eq!(tried, vec!["down", "up"]);
    }

    #[test]
    fn test_each_server_stops_on_other_errors() {
        let mut calls = 0;
        let result: Result<()> = each_server(&entries(&["a", "b"]), |_| {
            calls += 1;
            Err(IndirectorError::Http {
                code: 500,
                message: "boom".to_string(),
                issue_kind: None,
            })
        });
        assert_eq!(result.unwrap_err().status(), Some(500));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_each_server_reports_last_network_error() {
        let result: Result<()> = each_server(&entries(&["a", "b"]), |e| {
            Err(IndirectorError::Network(format!("{} down", e.host)))
        });
        assert_eq!(result.unwrap_err().to_string(), "Network error: b down");

        let empty: Result<()> = each_server(&[], |_| Ok(()));
        assert!(empty.unwrap_err().is_configuration());
    }
}
