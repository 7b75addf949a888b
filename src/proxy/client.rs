//! Outbound HTTP client.
//!
//! # Responsibilities
//! - Send rewritten requests to upstreams
//! - Return upstream responses as-is (redirects are not followed)
//!
//! # Design Decisions
//! - Behind the `Fetch` trait so pipelines can be exercised without a network
//! - Request bodies are buffered up to a limit; responses are streamed
//! - No request timeout here, only a connect timeout; the server's
//!   timeout layer bounds the whole exchange

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

use crate::proxy::patch::strip_hop_by_hop;
use crate::proxy::ProxyError;

/// Sends a request to its (absolute) URI.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    async fn fetch(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError>;
}

/// `reqwest`-backed upstream client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpClient {
    pub fn new(connect_timeout: Duration, max_body_bytes: usize) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            client,
            max_body_bytes,
        })
    }
}

#[async_trait]
impl Fetch for HttpClient {
    async fn fetch(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let (parts, body) = request.into_parts();
        let bytes = axum::body::to_bytes(body, self.max_body_bytes).await?;

        let upstream = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(bytes)
            .send()
            .await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
