mod outcome;

pub use outcome::{CONNECTION_FAILED, RequestOutcome, StatusClass};

use bytes::Bytes;
use http::Request;
use http::header::{CONTENT_TYPE, COOKIE, SERVER, USER_AGENT};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time;
use tracing::{debug, warn};

use crate::config::{FORM_CONTENT_TYPE, Method, RunConfiguration, replayable_header};

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid request: {0}")]
    Build(#[from] http::Error),
    #[error("{0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("failed reading body: {0}")]
    Body(#[from] hyper::Error),
}

/// Executes single requests against a target with the run's headers, cookies
/// and body. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct RequestTask {
    client: Client<HttpConnector, Full<Bytes>>,
    config: Arc<RunConfiguration>,
}

impl RequestTask {
    pub fn new(config: Arc<RunConfiguration>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.worker_count())
            .build(connector);

        Self { client, config }
    }

    /// Perform one request. Never fails: transport errors and timeouts come
    /// back as a connection-failure outcome.
    pub async fn execute(&self, url: &str) -> RequestOutcome {
        let request = match self.build_request(url) {
            Ok(request) => request,
            Err(e) => {
                warn!("Could not build request for {}: {}", url, e);
                return RequestOutcome::connection_failed(url);
            }
        };

        debug!("Requesting {}", url);
        let start = Instant::now();
        match time::timeout(self.config.timeout, self.send(request)).await {
            Ok(Ok((status, server, bytes))) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                if status != 200 {
                    warn!("Failed request to {}, resp code {}", url, status);
                }
                RequestOutcome {
                    elapsed_ms,
                    status,
                    url: url.to_string(),
                    bytes,
                    server,
                }
            }
            Ok(Err(e)) => {
                warn!("Failed to connect to {}: {}", url, e);
                RequestOutcome::connection_failed(url)
            }
            Err(_) => {
                warn!("Request to {} timed out after {:?}", url, self.config.timeout);
                RequestOutcome::connection_failed(url)
            }
        }
    }

    fn build_request(&self, url: &str) -> Result<Request<Full<Bytes>>, RequestError> {
        let config = &self.config;
        let set = config.pick_header_set();

        // a recorded user agent stands in for the picked one
        let user_agent = set
            .and_then(|set| {
                set.iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(USER_AGENT.as_str()))
            })
            .map(|(_, value)| value.as_str())
            .unwrap_or_else(|| config.pick_user_agent());

        let mut builder = Request::builder()
            .method(config.method().as_http())
            .uri(url)
            .header(USER_AGENT, user_agent);

        for (name, value) in &config.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        for (name, value) in set.into_iter().flatten() {
            if name.eq_ignore_ascii_case(USER_AGENT.as_str()) || !replayable_header(name) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookies) = config.cookie_header() {
            builder = builder.header(COOKIE, cookies);
        }

        let body = match config.method() {
            Method::Post => {
                builder = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE);
                Bytes::from(config.form_body())
            }
            Method::Get => Bytes::new(),
        };

        Ok(builder.body(Full::new(body))?)
    }

    // status, server header and body size; the body itself is dropped frame by frame
    async fn send(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<(u16, Option<String>, u64), RequestError> {
        let response = self.client.request(request).await?;
        let status = response.status().as_u16();
        let server = response
            .headers()
            .get(SERVER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let mut body = response.into_body();
        let mut bytes = 0u64;
        while let Some(frame) = body.frame().await {
            if let Some(data) = frame?.data_ref() {
                bytes += data.len() as u64;
            }
        }

        Ok((status, server, bytes))
    }
}
