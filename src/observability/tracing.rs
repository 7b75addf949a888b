//! Request spans.
//!
//! Every inbound request gets a span carrying its request ID, so log lines
//! from the router, cache and proxy can be correlated.

use axum::http::Request;
use tracing::Span;

use crate::http::request::request_id;

/// Span for one inbound request. Used as the `TraceLayer` span maker.
pub fn make_span<B>(request: &Request<B>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id(request),
        method = %request.method(),
        uri = %request.uri(),
    )
}
