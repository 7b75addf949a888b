//! Request handling helpers.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) for every inbound request
//! - Give inbound requests an absolute URI (scheme + authority)
//! - Extract routing-relevant information (URL, hostname, path)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The authority comes from the URI when present, else the Host header
//! - Original request is never mutated; helpers return new values

use axum::body::Body;
use axum::http::{header, uri::Authority, HeaderName, HeaderValue, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;

/// Header carrying the request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Request ID of a request, "unknown" if none was assigned.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Parse the request's absolute URI as a URL.
pub fn url_of<B>(request: &Request<B>) -> Result<Url, url::ParseError> {
    Url::parse(&request.uri().to_string())
}

/// Hostname of a request, without port, from the URI or the Host header.
pub fn hostname<B>(request: &Request<B>) -> Option<String> {
    if let Some(host) = request.uri().host() {
        return Some(host.to_string());
    }
    request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.parse::<Authority>().ok())
        .map(|authority| authority.host().to_string())
}

/// Give a server-side request an absolute URI.
///
/// The authority is taken from the Host header (falling back to
/// `localhost`) and the scheme from `X-Forwarded-Proto` or `default_scheme`.
pub fn absolutize(request: Request<Body>, default_scheme: &str) -> Request<Body> {
    if request.uri().scheme().is_some() && request.uri().authority().is_some() {
        return request;
    }

    let authority = request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost")
        .to_string();
    let scheme = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .filter(|s| *s == "http" || *s == "https")
        .unwrap_or(default_scheme)
        .to_string();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let (mut parts, body) = request.into_parts();
    match Uri::builder()
        .scheme(scheme.as_str())
        .authority(authority.as_str())
        .path_and_query(path_and_query.as_str())
        .build()
    {
        Ok(uri) => parts.uri = uri,
        Err(e) => {
            tracing::warn!(error = %e, host = %authority, "Could not build absolute request URI");
        }
    }
    Request::from_parts(parts, body)
}

/// Copy of `request` with its URI replaced, sharing the body.
pub fn with_uri(request: Request<Body>, uri: Uri) -> Request<Body> {
    let (mut parts, body) = request.into_parts();
    parts.uri = uri;
    Request::from_parts(parts, body)
}
