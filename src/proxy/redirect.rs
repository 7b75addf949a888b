//! Hard redirects.

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use url::Url;

use crate::http::event::{FetchEvent, ServeFunction};
use crate::proxy::ProxyError;

/// Redirect every request to `target`, discarding path and query.
pub fn to(target: &str) -> Result<ServeFunction, ProxyError> {
    let url = Url::parse(target).map_err(|e| ProxyError::InvalidUpstream(target.to_string(), e))?;
    let location = HeaderValue::from_str(url.as_str())
        .map_err(|_| ProxyError::InvalidHeader(url.to_string()))?;

    Ok(ServeFunction::new(move |_event: FetchEvent| {
        let location = location.clone();
        async move {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::FOUND;
            response.headers_mut().insert(header::LOCATION, location);
            Ok(response)
        }
    }))
}
