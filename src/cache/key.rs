//! Cache keys.
//!
//! The backing store has no notion of `Vary`, so the request headers that
//! affect a response are hashed into the key's path instead:
//! `GET /docs` becomes `GET /__magic_cache/<hash>/docs`.

use std::fmt;

use axum::http::{header, HeaderName, Method, Request};
use sha2::{Digest, Sha256};
use url::Url;

use crate::http::request::url_of;

/// Path prefix of derived GET keys.
pub const CACHE_PREFIX: &str = "/__magic_cache";

/// Headers whose values partition cached responses, in hashing order.
pub const VARY_HEADERS: [HeaderName; 4] = [
    header::ACCEPT_ENCODING,
    header::AUTHORIZATION,
    header::COOKIE,
    HeaderName::from_static("x-cdn-host"),
];

/// Hex sha256 over the seed and the vary header values, comma-joined.
///
/// Missing headers contribute an empty value, so positions stay stable.
pub fn vary_hash<B>(request: &Request<B>, seed: &str) -> String {
    let mut parts = Vec::with_capacity(VARY_HEADERS.len() + 1);
    parts.push(seed);
    for name in &VARY_HEADERS {
        let value = request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        parts.push(value);
    }

    hex::encode(Sha256::digest(parts.join(",").as_bytes()))
}

/// Identity of a request in the cache store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: Method,
    pub url: Url,
}

impl RequestKey {
    /// Only GET keys are ever looked up or stored.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Cache key of `request`: its own identity for non-GET requests, the
/// vary-prefixed URL for GET.
pub fn cache_key<B>(request: &Request<B>, seed: &str) -> Result<RequestKey, url::ParseError> {
    cache_key_for_hash(request, &vary_hash(request, seed))
}

/// [`cache_key`] with an already computed vary hash.
pub fn cache_key_for_hash<B>(request: &Request<B>, hash: &str) -> Result<RequestKey, url::ParseError> {
    let mut url = url_of(request)?;
    if request.method() == Method::GET {
        let path = format!("{}/{}{}", CACHE_PREFIX, hash, url.path());
        url.set_path(&path);
    }

    Ok(RequestKey {
        method: request.method().clone(),
        url,
    })
}
