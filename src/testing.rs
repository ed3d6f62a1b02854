//! Stub HTTP servers for tests.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct StubResponse {
    status: u16,
    body: &'static str,
    servers: Vec<&'static str>,
    delay: Duration,
}

impl StubResponse {
    pub fn ok(body: &'static str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &'static str) -> Self {
        Self {
            status,
            body,
            servers: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn server(self, name: &'static str) -> Self {
        self.servers(vec![name])
    }

    /// `Server` header for the nth request served; the last one repeats.
    pub fn servers(mut self, names: Vec<&'static str>) -> Self {
        self.servers = names;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub type Seen = Arc<Mutex<Vec<SeenRequest>>>;

pub async fn spawn_stub(response: StubResponse) -> SocketAddr {
    spawn_stub_with(response).await.0
}

/// Serve `response` to every request on a fresh local port, remembering what
/// was received.
pub async fn spawn_stub_with(response: StubResponse) -> (SocketAddr, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Seen = Arc::default();
    let served = Arc::new(AtomicUsize::new(0));
    let response = Arc::new(response);

    let log = seen.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let response = response.clone();
            let log = log.clone();
            let served = served.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let response = response.clone();
                    let log = log.clone();
                    let served = served.clone();
                    async move { respond(req, &response, &log, &served).await }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (addr, seen)
}

async fn respond(
    req: Request<Incoming>,
    response: &StubResponse,
    log: &Seen,
    served: &AtomicUsize,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let n = served.fetch_add(1, Ordering::SeqCst);
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    log.lock().unwrap().push(SeenRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let mut builder = Response::builder().status(response.status);
    if let Some(server) = response.servers.get(n).or(response.servers.last()) {
        builder = builder.header("server", *server);
    }
    Ok(builder
        .body(Full::new(Bytes::from_static(response.body.as_bytes())))
        .unwrap())
}
