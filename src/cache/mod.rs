//! Caching proxy pipeline.
//!
//! # Data Flow
//! ```text
//! FetchEvent
//!     → key.rs (vary hash, cache key)
//!     → store.rs lookup
//!         hit  → cached response + hit headers, `link` removed
//!         miss → inner handler
//!               → response streamed to the client with a bounded copy
//!               → copy written back in the background once complete
//!               → response + miss headers
//! ```
//!
//! # Design Decisions
//! - Fail open: a lookup error is a miss, a write-back error is logged
//! - Write-back is registered with the host's background tasks so it
//!   survives the response being sent
//! - Non-GET requests skip the store entirely
//! - Responses a store would refuse, or whose `Content-Length` exceeds the
//!   copy limit, are streamed through without a copy

pub mod key;
pub mod store;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Response};

use crate::http::event::{FetchEvent, ServeFunction};
use crate::http::response::ServeError;
use crate::observability::metrics;
use crate::proxy::{patch_response, HeaderChanges, ProxyError};

pub use key::{cache_key, vary_hash, RequestKey};
pub use store::{CacheError, CacheStore, CachedResponse, MemoryCache};

/// Largest body copied for write-back by default.
pub const DEFAULT_MAX_CACHE_BYTES: usize = 1024 * 1024;

/// Default vary-hash seed.
pub const DEFAULT_SEED: &str = "42";

pub const VIA_HIT: &str = "magic cache";
pub const VIA_MISS: &str = "no cache";

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
const X_MAGIC_HASH: HeaderName = HeaderName::from_static("x-magic-hash");

/// Wraps handlers with a lookup/write-back cache.
#[derive(Clone)]
pub struct CachingProxy {
    store: Arc<dyn CacheStore>,
    seed: Arc<str>,
    max_bytes: usize,
}

impl CachingProxy {
    pub fn new(store: Arc<dyn CacheStore>, seed: &str) -> Self {
        Self {
            store,
            seed: Arc::from(seed),
            max_bytes: DEFAULT_MAX_CACHE_BYTES,
        }
    }

    /// Largest body copied for write-back. Larger responses are not cached.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// `handler` behind the cache.
    pub fn wrap(&self, handler: ServeFunction) -> ServeFunction {
        let cache = self.clone();
        ServeFunction::new(move |event: FetchEvent| {
            let cache = cache.clone();
            let handler = handler.clone();
            async move { cache.serve(handler, event).await }
        })
    }

    async fn serve(&self, handler: ServeFunction, event: FetchEvent) -> Result<Response<Body>, ServeError> {
        let hash = key::vary_hash(event.request(), &self.seed);
        let key = key::cache_key_for_hash(event.request(), &hash)?;

        if !key.is_cacheable() {
            metrics::record_cache("bypass");
            let response = handler.call(event).await?;
            return Ok(patch_response(response, &miss_headers(&hash)?));
        }

        match self.store.lookup(&key).await {
            Ok(Some(cached)) => {
                tracing::debug!(key = %key, "Cache hit");
                metrics::record_cache("hit");
                return Ok(patch_response(cached.into_response(), &hit_headers(&hash)?));
            }
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
            }
        }
        metrics::record_cache("miss");

        let tasks = event.tasks().clone();
        let response = handler.call(event).await?;
        if !store::is_storable(response.status(), response.headers())
            || declared_length(&response).is_some_and(|len| len > self.max_bytes as u64)
        {
            tracing::debug!(key = %key, status = %response.status(), "Response not cacheable");
            return Ok(patch_response(response, &miss_headers(&hash)?));
        }

        let (response, pending) = store::capture(response, self.max_bytes);
        let store = self.store.clone();
        tasks.wait_until(async move {
            let label = key.to_string();
            let Some(copy) = pending.finish().await else {
                tracing::debug!(key = %label, "Response copy incomplete, not stored");
                return;
            };
            if let Err(e) = store.put(key, copy).await {
                tracing::warn!(key = %label, error = %e, "Cache write-back failed");
            }
        });

        Ok(patch_response(response, &miss_headers(&hash)?))
    }
}

impl std::fmt::Debug for CachingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingProxy")
            .field("seed", &self.seed)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

fn declared_length(response: &Response<Body>) -> Option<u64> {
    response
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn hash_value(hash: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(hash).map_err(|_| ProxyError::InvalidHeader(hash.to_string()))
}

fn hit_headers(hash: &str) -> Result<HeaderChanges, ProxyError> {
    Ok(HeaderChanges::new()
        .set(axum::http::header::VIA, HeaderValue::from_static(VIA_HIT))
        .set(X_MAGIC_HASH, hash_value(hash)?)
        .set(X_CACHE, HeaderValue::from_static("HIT"))
        .remove(axum::http::header::LINK))
}

fn miss_headers(hash: &str) -> Result<HeaderChanges, ProxyError> {
    Ok(HeaderChanges::new()
        .set(axum::http::header::VIA, HeaderValue::from_static(VIA_MISS))
        .set(X_MAGIC_HASH, hash_value(hash)?)
        .set(X_CACHE, HeaderValue::from_static("MISS")))
}
