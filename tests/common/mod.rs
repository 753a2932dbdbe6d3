//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use indirector::config::Settings;
use indirector::indirection::{Indirection, IndirectionOptions};
use indirector::model::Document;
use indirector::terminus::{self, memory::Memory, Terminus};
use indirector::HttpServer;

/// A canned reply from a mock backend.
#[allow(dead_code)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl MockReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Start a programmable mock backend on an ephemeral port.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockReply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut request = vec![0u8; 16 * 1024];
                        let _ = socket.read(&mut request).await;

                        let reply = f().await;
                        let reason = StatusCode::from_u16(reply.status)
                            .ok()
                            .and_then(|s| s.canonical_reason())
                            .unwrap_or("Unknown");
                        let mut head = format!(
                            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                            reply.status,
                            reason,
                            reply.body.len()
                        );
                        for (name, value) in &reply.headers {
                            head.push_str(&format!("{}: {}\r\n", name, value));
                        }
                        head.push_str("\r\n");

                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&reply.body).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Serve registered document indirections on an ephemeral port.
#[allow(dead_code)]
pub async fn start_indirector(settings: &Settings) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = HttpServer::new(settings)
        .router()
        .into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Register a document indirection backed by a memory terminus.
#[allow(dead_code)]
pub fn serve_memory(name: &str) -> Arc<Indirection<Document>> {
    let indirection = Indirection::<Document>::register(
        name,
        IndirectionOptions::default().terminus_class(terminus::memory::TERMINUS_TYPE),
    )
    .unwrap();
    terminus::register::<Document, _>(name, terminus::memory::TERMINUS_TYPE, |d| {
        Ok(Arc::new(Memory::<Document>::new(d)) as Arc<dyn Terminus<Document>>)
    })
    .unwrap();
    indirection
}

/// Client settings pointing plain HTTP at `addr`.
#[allow(dead_code)]
pub fn client_settings(addr: SocketAddr) -> Settings {
    let mut settings = Settings::default();
    settings.http.scheme = "http".to_string();
    settings.http.use_proxy = false;
    settings.server = addr.ip().to_string();
    settings.port = addr.port();
    settings
}
