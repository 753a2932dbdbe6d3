//! REST terminus against the crate's own server.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;

use indirector::config::{self, Settings};
use indirector::indirection::{Indirection, IndirectionOptions};
use indirector::model::Document;
use indirector::request::{Method, Options, Request};
use indirector::terminus::rest::{self, ReqwestNetwork, Rest};
use indirector::terminus::{self as termini, Authorize, Terminus, TerminusDescriptor};
use indirector::{IndirectorError, Result};

mod common;

fn client(addr: SocketAddr, name: &str) -> Rest<Document> {
    let network = ReqwestNetwork::new(&common::client_settings(addr).http).unwrap();
    Rest::new(
        TerminusDescriptor::new(name, rest::TERMINUS_TYPE),
        Arc::new(network),
    )
}

fn request(name: &str, method: Method, key: &str, options: Options) -> Request<Document> {
    let instance =
        (method == Method::Save).then(|| Document::new(key, json!({"role": "web", "n": 3})));
    Request::new(name, method, Some(key), instance, options).unwrap()
}

/// Run blocking client calls with settings pointing at the server.
async fn with_client<T, F>(addr: SocketAddr, settings: Settings, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let _guard = config::override_for_thread(settings);
        f()
    })
    .await
    .unwrap_or_else(|e| panic!("client thread failed for {}: {}", addr, e))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_save_find_search_destroy_over_http() {
    let name = "wire-doc";
    let served = common::serve_memory(name);
    let addr = common::start_indirector(&Settings::default()).await;

    with_client(addr, common::client_settings(addr), move || {
        let rest = client(addr, name);

        let saved = rest
            .save(&request(name, Method::Save, "web 01", Options::new()))
            .unwrap()
            .unwrap();
        assert_eq!(saved, Document::new("web 01", json!({"role": "web", "n": 3})));

        let found = rest
            .find(&request(name, Method::Find, "web 01", Options::new()))
            .unwrap()
            .unwrap();
        assert_eq!(found, saved);
        assert!(found.expiration.is_some());

        assert!(rest
            .head(&request(name, Method::Head, "web 01", Options::new()))
            .unwrap());

        rest.save(&request(name, Method::Save, "db01", Options::new()))
            .unwrap();
        let all = rest
            .search(&request(name, Method::Search, "*", Options::new()))
            .unwrap();
        assert_eq!(
            all.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["db01", "web 01"]
        );

        let removed = rest
            .destroy(&request(name, Method::Destroy, "web 01", Options::new()))
            .unwrap();
        assert_eq!(removed.map(|d| d.name), Some("web 01".to_string()));

        assert!(rest
            .find(&request(name, Method::Find, "web 01", Options::new()))
            .unwrap()
            .is_none());
        assert!(!rest
            .head(&request(name, Method::Head, "web 01", Options::new()))
            .unwrap());
    })
    .await;

    served.delete();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_not_found_handling_over_http() {
    let name = "wire-missing";
    let served = common::serve_memory(name);
    let addr = common::start_indirector(&Settings::default()).await;

    with_client(addr, common::client_settings(addr), move || {
        let rest = client(addr, name);

        assert!(rest
            .find(&request(name, Method::Find, "nope", Options::new()))
            .unwrap()
            .is_none());

        let options = Options::new().with("fail_on_404", true);
        let err = rest
            .find(&request(name, Method::Find, "nope", options))
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().starts_with(
            "Find /indirector/v3/wire-missing/nope?environment=production&fail_on_404=true resulted in 404"
        ));
        assert!(err.to_string().contains("Could not find wire-missing"));

        // Unknown indirections are plain 404s too.
        let unknown = client(addr, "no-such-indirection");
        assert!(unknown
            .find(&request("no-such-indirection", Method::Find, "x", Options::new()))
            .unwrap()
            .is_none());

        // Destroying a missing key is an argument error on the server.
        let err = rest
            .destroy(&request(name, Method::Destroy, "nope", Options::new()))
            .unwrap_err();
        match err {
            IndirectorError::Http {
                code, issue_kind, ..
            } => {
                assert_eq!(code, 400);
                assert_eq!(issue_kind.as_deref(), Some("ARGUMENT"));
            }
            other => panic!("unexpected error: {other}"),
        }
    })
    .await;

    served.delete();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_long_query_is_posted() {
    let name = "wire-post";
    let served = common::serve_memory(name);
    served
        .save(Document::new("big", json!(1)), None, Options::new())
        .unwrap();
    let addr = common::start_indirector(&Settings::default()).await;

    let mut settings = common::client_settings(addr);
    settings.http.max_get_url_length = 64;

    with_client(addr, settings, move || {
        let rest = client(addr, name);
        let options = Options::new().with("padding", "p".repeat(500));
        let found = rest
            .find(&request(name, Method::Find, "big", options))
            .unwrap()
            .unwrap();
        assert_eq!(found.data, json!(1));
    })
    .await;

    served.delete();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_current_peer_is_not_downgraded() {
    let name = "wire-version";
    let served = common::serve_memory(name);
    served
        .save(Document::new("v", json!(null)), None, Options::new())
        .unwrap();
    let addr = common::start_indirector(&Settings::default()).await;

    let format = with_client(addr, common::client_settings(addr), move || {
        client(addr, name)
            .find(&request(name, Method::Find, "v", Options::new()))
            .unwrap();
        config::current().preferred_serialization_format.clone()
    })
    .await;
    assert_eq!(format, "json");

    served.delete();
}

struct Guarded {
    descriptor: TerminusDescriptor,
}

impl Authorize<Document> for Guarded {
    fn is_authorized(&self, request: &Request<Document>) -> bool {
        request.key() != "secret"
    }
}

impl Terminus<Document> for Guarded {
    fn descriptor(&self) -> &TerminusDescriptor {
        &self.descriptor
    }

    fn find(&self, request: &Request<Document>) -> Result<Option<Document>> {
        Ok(Some(Document::new(request.key(), json!("public"))))
    }

    fn authorizer(&self) -> Option<&dyn Authorize<Document>> {
        Some(self)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_calls_are_authorized() {
    let name = "wire-guarded";
    let served = Indirection::<Document>::register(
        name,
        IndirectionOptions::default().terminus_class("guarded"),
    )
    .unwrap();
    termini::register::<Document, _>(name, "guarded", |descriptor| {
        Ok(Arc::new(Guarded { descriptor }) as Arc<dyn Terminus<Document>>)
    })
    .unwrap();
    let addr = common::start_indirector(&Settings::default()).await;

    with_client(addr, common::client_settings(addr), move || {
        let rest = client(addr, name);

        let open = rest
            .find(&request(name, Method::Find, "open", Options::new()))
            .unwrap()
            .unwrap();
        assert_eq!(open.data, json!("public"));

        match rest
            .find(&request(name, Method::Find, "secret", Options::new()))
            .unwrap_err()
        {
            IndirectorError::Http {
                code,
                message,
                issue_kind,
            } => {
                assert_eq!(code, 403);
                assert_eq!(message, "Not authorized to call find on secret");
                assert_eq!(issue_kind.as_deref(), Some("NOT_AUTHORIZED"));
            }
            other => panic!("unexpected error: {other}"),
        }
    })
    .await;

    served.delete();
}
