//! Response handling at the serve boundary.
//!
//! # Responsibilities
//! - Define the error type handlers return
//! - Convert handler failures into 500 responses carrying the diagnostic
//! - Produce the distinguished "unrouted" response
//!
//! # Design Decisions
//! - Only transport-level failures are errors; a non-2xx upstream status is
//!   a normal response and passes through untouched
//! - No retries here; retry policy belongs to an outer layer

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use thiserror::Error;

use crate::proxy::ProxyError;

/// Body of the response returned when no route matches.
pub const UNROUTED_BODY: &str = "firecloud: no matching route";

/// Errors surfaced by a `ServeFunction`.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid request URI: {0}")]
    Uri(#[from] axum::http::Error),
}

/// 500 response for a request no route accepted.
pub fn unrouted() -> Response<Body> {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, UNROUTED_BODY.to_string())
}

/// 500 response carrying the failure's diagnostic text.
pub fn failure(err: &ServeError) -> Response<Body> {
    tracing::error!(error = %err, "Request failed");
    crate::observability::metrics::record_serve_error();
    text_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// Collapse a handler result into a response.
pub fn into_response(result: Result<Response<Body>, ServeError>) -> Response<Body> {
    match result {
        Ok(response) => response,
        Err(err) => failure(&err),
    }
}

fn text_response(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unrouted_is_500() {
        let response = unrouted();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], UNROUTED_BODY.as_bytes());
    }

    #[tokio::test]
    async fn test_failure_carries_diagnostic() {
        let err = ServeError::from(ProxyError::NoUpstreams);
        let response = into_response(Err(err));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"No upstreams configured");
    }

    #[test]
    fn test_ok_passes_through() {
        let mut ok = Response::new(Body::empty());
        *ok.status_mut() = StatusCode::NOT_FOUND;
        assert_eq!(into_response(Ok(ok)).status(), StatusCode::NOT_FOUND);
    }
}
