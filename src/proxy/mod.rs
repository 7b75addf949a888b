//! Reverse proxy subsystem.
//!
//! # Data Flow
//! ```text
//! FetchEvent
//!     → picker.rs (choose upstream base URL)
//!     → upstream.rs (rewrite URL, host policy, header hook)
//!     → client.rs (send, redirects not followed)
//!     → upstream Response (returned untouched)
//!
//! On the way back:
//!     patch.rs (deterministic header changes, applied by callers)
//! ```
//!
//! # Design Decisions
//! - Only transport failures are errors; any upstream status is a response
//! - No retries, no timeouts beyond the client's connect timeout

pub mod client;
pub mod patch;
pub mod picker;
pub mod redirect;
pub mod upstream;

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Response;
use thiserror::Error;

use crate::http::event::{FetchEvent, ServeFunction};
use crate::http::response::ServeError;
use crate::observability::metrics;

pub use client::{Fetch, HttpClient};
pub use patch::{patch_response, HeaderChanges, HeaderError};
pub use picker::Picker;
pub use upstream::{to_upstream, HostPolicy, ProxyOptions};

/// Errors raised while proxying a request.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid upstream URI: {0}")]
    Uri(#[from] axum::http::uri::InvalidUri),

    #[error("Invalid upstream URL {0}: {1}")]
    InvalidUpstream(String, url::ParseError),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("Invalid function name: {0}")]
    InvalidFunctionName(String),

    #[error("No upstreams configured")]
    NoUpstreams,

    #[error("Failed to read request body: {0}")]
    Body(#[from] axum::Error),

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A `ServeFunction` forwarding every request to the upstream chosen by `picker`.
pub fn proxy(picker: Picker, client: Arc<dyn Fetch>, options: ProxyOptions) -> ServeFunction {
    ServeFunction::new(move |event: FetchEvent| {
        forward(picker.clone(), client.clone(), options.clone(), event)
    })
}

async fn forward(
    picker: Picker,
    client: Arc<dyn Fetch>,
    options: ProxyOptions,
    event: FetchEvent,
) -> Result<Response<Body>, ServeError> {
    let request = event.into_request();
    let endpoint = picker(&request);
    let upstream_request = to_upstream(request, &endpoint, &options)?;

    tracing::debug!(
        method = %upstream_request.method(),
        upstream = %upstream_request.uri(),
        "Forwarding request"
    );

    let upstream_host = endpoint.host_str().unwrap_or("unknown");
    let start = Instant::now();
    match client.fetch(upstream_request).await {
        Ok(response) => {
            metrics::record_upstream(upstream_host, start);
            Ok(response)
        }
        Err(e) => {
            tracing::error!(upstream = %endpoint, error = %e, "Upstream error");
            metrics::record_upstream_error(upstream_host);
            Err(e.into())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process upstream double.

    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, Response};

    use super::{Fetch, ProxyError};

    /// Records every request and answers with a canned response.
    pub struct RecordingFetch {
        pub requests: Mutex<Vec<Request<()>>>,
        respond: Box<dyn Fn(&Request<()>) -> Response<Body> + Send + Sync>,
    }

    impl RecordingFetch {
        pub fn new<F>(respond: F) -> Self
        where
            F: Fn(&Request<()>) -> Response<Body> + Send + Sync + 'static,
        {
            Self {
                requests: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Fetch for RecordingFetch {
        async fn fetch(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
            let (parts, _body) = request.into_parts();
            let request = Request::from_parts(parts, ());
            let response = (self.respond)(&request);
            self.requests.lock().unwrap().push(request);
            Ok(response)
        }
    }
}
