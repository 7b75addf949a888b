//! Cache storage.
//!
//! # Responsibilities
//! - Define the store contract the caching pipeline talks to
//! - Decide which responses an edge cache may keep, and for how long
//! - Copy a response while it streams to the client
//! - Provide a bounded in-process store
//!
//! # Design Decisions
//! - Like an edge cache, stores decline partial content, `Set-Cookie`
//!   responses and `private`, `no-cache` or `no-store` responses
//! - Freshness comes from `s-maxage`, then `max-age`, then the store's default
//! - The copy is capped; a larger or failed body is streamed but not kept
//! - The memory store sweeps expired entries when full, then evicts the
//!   entry closest to expiry

use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::{Body, BodyDataStream};
use axum::http::{header, HeaderMap, Response, StatusCode};
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures_util::Stream;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::cache::key::RequestKey;

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Errors raised by a cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    #[error("Key is not cacheable: {0}")]
    NotCacheable(String),
}

/// A buffered response as kept by a store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    pub fn is_storable(&self) -> bool {
        is_storable(self.status, &self.headers)
    }
}

/// Returns true if an edge cache may keep a response with this status and headers.
pub fn is_storable(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::PARTIAL_CONTENT || headers.contains_key(header::SET_COOKIE) {
        return false;
    }
    let refused = cache_directives(headers)
        .iter()
        .any(|(name, _)| matches!(name.as_str(), "no-store" | "private" | "no-cache"));
    if refused {
        return false;
    }
    freshness(headers).map_or(true, |ttl| !ttl.is_zero())
}

/// Lifetime granted by `s-maxage`, or failing that `max-age`.
pub fn freshness(headers: &HeaderMap) -> Option<Duration> {
    let directives = cache_directives(headers);
    let seconds = |name: &str| {
        directives
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, value)| value.as_deref()?.parse::<u64>().ok())
    };
    seconds("s-maxage")
        .or_else(|| seconds("max-age"))
        .map(Duration::from_secs)
}

/// `Cache-Control` directives as lowercase names with optional values.
fn cache_directives(headers: &HeaderMap) -> Vec<(String, Option<String>)> {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|directive| {
            let directive = directive.trim();
            if directive.is_empty() {
                return None;
            }
            let (name, value) = match directive.split_once('=') {
                Some((name, value)) => (name, Some(value.trim().trim_matches('"').to_string())),
                None => (directive, None),
            };
            Some((name.trim().to_ascii_lowercase(), value))
        })
        .collect()
}

/// The stored copy of a response that is still streaming to the client.
#[derive(Debug)]
pub struct PendingCopy {
    status: StatusCode,
    headers: HeaderMap,
    body: oneshot::Receiver<Bytes>,
}

impl PendingCopy {
    /// Resolves once the body has been read to the end. `None` when it was
    /// over the limit, failed, or was dropped before completing.
    pub async fn finish(self) -> Option<CachedResponse> {
        let body = self.body.await.ok()?;
        Some(CachedResponse {
            status: self.status,
            headers: self.headers,
            body,
        })
    }
}

/// Stream `response` through unchanged while keeping a copy of at most
/// `max_bytes` of body.
pub fn capture(response: Response<Body>, max_bytes: usize) -> (Response<Body>, PendingCopy) {
    let (parts, body) = response.into_parts();
    let (tx, rx) = oneshot::channel();

    let pending = PendingCopy {
        status: parts.status,
        headers: parts.headers.clone(),
        body: rx,
    };
    let tee = Tee {
        inner: body.into_data_stream(),
        copy: Some((BytesMut::new(), tx)),
        max_bytes,
    };
    (Response::from_parts(parts, Body::from_stream(tee)), pending)
}

struct Tee {
    inner: BodyDataStream,
    /// Dropped, along with its sender, once the copy is abandoned.
    copy: Option<(BytesMut, oneshot::Sender<Bytes>)>,
    max_bytes: usize,
}

impl Stream for Tee {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let item = ready!(Pin::new(&mut this.inner).poll_next(cx));

        match &item {
            Some(Ok(chunk)) => {
                let max_bytes = this.max_bytes;
                let over = this
                    .copy
                    .as_ref()
                    .is_some_and(|(buffer, _)| buffer.len() + chunk.len() > max_bytes);
                if over {
                    this.copy = None;
                } else if let Some((buffer, _)) = &mut this.copy {
                    buffer.extend_from_slice(chunk);
                }
            }
            Some(Err(_)) => this.copy = None,
            None => {
                if let Some((buffer, tx)) = this.copy.take() {
                    let _ = tx.send(buffer.freeze());
                }
            }
        }
        Poll::Ready(item)
    }
}

/// External response cache.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>, CacheError>;

    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<(), CacheError>;
}

#[derive(Debug)]
struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

/// Bounded in-process store backed by a concurrent map.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<RequestKey, Entry>,
    max_entries: usize,
    default_ttl: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_entries` responses; `default_ttl` applies to
    /// responses without `max-age` or `s-maxage`.
    pub fn with_limits(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            default_ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_at(&self, key: &RequestKey, now: Instant) -> Option<CachedResponse> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.response.clone());
            }
        } else {
            return None;
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    fn insert_at(&self, key: RequestKey, response: CachedResponse, now: Instant) {
        let ttl = freshness(&response.headers)
            .unwrap_or(self.default_ttl)
            .min(MAX_TTL);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.make_room(now);
        }
        self.entries.insert(
            key,
            Entry {
                response,
                expires_at: now + ttl,
            },
        );
    }

    fn make_room(&self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
        while self.entries.len() >= self.max_entries {
            let soonest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());
            match soonest {
                Some(key) => {
                    tracing::debug!(key = %key, "Evicting cache entry");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>, CacheError> {
        Ok(self.get_at(key, Instant::now()))
    }

    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<(), CacheError> {
        if !key.is_cacheable() {
            return Err(CacheError::NotCacheable(key.to_string()));
        }
        if !response.is_storable() {
            tracing::debug!(key = %key, status = %response.status, "Response not stored");
            return Ok(());
        }
        self.insert_at(key, response, Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Method};
    use url::Url;

    fn key(method: Method, path: &str) -> RequestKey {
        RequestKey {
            method,
            url: Url::parse(&format!("https://a.com{}", path)).unwrap(),
        }
    }

    fn cached(status: StatusCode, cache_control: Option<&'static str>) -> CachedResponse {
        let mut headers = HeaderMap::new();
        if let Some(value) = cache_control {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(value));
        }
        CachedResponse {
            status,
            headers,
            body: Bytes::from_static(b"hello"),
        }
    }

    #[tokio::test]
    async fn test_put_then_lookup() {
        let store = MemoryCache::new();
        let k = key(Method::GET, "/x");
        assert!(store.lookup(&k).await.unwrap().is_none());

        store.put(k.clone(), cached(StatusCode::OK, None)).await.unwrap();
        let hit = store.lookup(&k).await.unwrap().unwrap();
        assert_eq!(hit.status, StatusCode::OK);
        assert_eq!(&hit.body[..], b"hello");
        assert!(store.lookup(&key(Method::GET, "/y")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_declines_partial_and_no_store() {
        let store = MemoryCache::new();
        store
            .put(key(Method::GET, "/a"), cached(StatusCode::PARTIAL_CONTENT, None))
            .await
            .unwrap();
        store
            .put(key(Method::GET, "/b"), cached(StatusCode::OK, Some("private, No-Store")))
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_declines_per_user_responses() {
        let store = MemoryCache::new();
        for (i, cache_control) in ["private", "no-cache", "max-age=0", "public, Max-Age=0"]
            .into_iter()
            .enumerate()
        {
            store
                .put(key(Method::GET, &format!("/{}", i)), cached(StatusCode::OK, Some(cache_control)))
                .await
                .unwrap();
        }

        let mut with_cookie = cached(StatusCode::OK, Some("public, max-age=60"));
        with_cookie
            .headers
            .insert(header::SET_COOKIE, HeaderValue::from_static("session=alice"));
        store.put(key(Method::GET, "/login"), with_cookie).await.unwrap();

        assert!(store.is_empty());
    }

    #[test]
    fn test_storable_and_freshness() {
        let headers = |value: &'static str| {
            let mut headers = HeaderMap::new();
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(value));
            headers
        };

        assert!(is_storable(StatusCode::OK, &HeaderMap::new()));
        assert!(is_storable(StatusCode::NOT_FOUND, &headers("public, max-age=60")));
        // A shared-cache lifetime overrides a zero max-age
        assert!(is_storable(StatusCode::OK, &headers("max-age=0, s-maxage=30")));
        assert!(!is_storable(StatusCode::OK, &headers("public, private=\"set-cookie\"")));

        assert_eq!(freshness(&headers("max-age=60")), Some(Duration::from_secs(60)));
        assert_eq!(
            freshness(&headers("max-age=60, s-maxage=\"600\"")),
            Some(Duration::from_secs(600))
        );
        assert_eq!(freshness(&headers("max-age=soon")), None);
        assert_eq!(freshness(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_rejects_non_get() {
        let store = MemoryCache::new();
        let result = store.put(key(Method::POST, "/a"), cached(StatusCode::OK, None)).await;
        assert!(matches!(result, Err(CacheError::NotCacheable(_))));
    }

    #[test]
    fn test_entries_expire() {
        let store = MemoryCache::with_limits(10, Duration::from_secs(300));
        let now = Instant::now();
        store.insert_at(key(Method::GET, "/short"), cached(StatusCode::OK, Some("max-age=60")), now);
        store.insert_at(key(Method::GET, "/default"), cached(StatusCode::OK, None), now);

        let later = now + Duration::from_secs(61);
        assert!(store.get_at(&key(Method::GET, "/short"), later).is_none());
        assert!(store.get_at(&key(Method::GET, "/default"), later).is_some());
        // Expired entries are dropped on lookup
        assert_eq!(store.len(), 1);

        let much_later = now + Duration::from_secs(301);
        assert!(store.get_at(&key(Method::GET, "/default"), much_later).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_evicts_soonest_expiry() {
        let store = MemoryCache::with_limits(2, Duration::from_secs(300));
        let now = Instant::now();
        store.insert_at(key(Method::GET, "/a"), cached(StatusCode::OK, Some("max-age=10")), now);
        store.insert_at(key(Method::GET, "/b"), cached(StatusCode::OK, Some("max-age=100")), now);
        store.insert_at(key(Method::GET, "/c"), cached(StatusCode::OK, None), now);

        assert_eq!(store.len(), 2);
        assert!(store.get_at(&key(Method::GET, "/a"), now).is_none());
        assert!(store.get_at(&key(Method::GET, "/b"), now).is_some());
        assert!(store.get_at(&key(Method::GET, "/c"), now).is_some());

        // Replacing an existing key never evicts
        store.insert_at(key(Method::GET, "/b"), cached(StatusCode::OK, None), now);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_full_store_sweeps_expired_first() {
        let store = MemoryCache::with_limits(2, Duration::from_secs(300));
        let now = Instant::now();
        store.insert_at(key(Method::GET, "/a"), cached(StatusCode::OK, Some("max-age=1")), now);
        store.insert_at(key(Method::GET, "/b"), cached(StatusCode::OK, Some("max-age=1")), now);

        let later = now + Duration::from_secs(5);
        store.insert_at(key(Method::GET, "/c"), cached(StatusCode::OK, None), later);
        assert_eq!(store.len(), 1);
        assert!(store.get_at(&key(Method::GET, "/c"), later).is_some());
    }

    async fn read(response: Response<Body>) -> Result<Bytes, axum::Error> {
        axum::body::to_bytes(response.into_body(), usize::MAX).await
    }

    #[tokio::test]
    async fn test_capture_copies_streamed_body() {
        let mut response = Response::new(Body::from("payload"));
        *response.status_mut() = StatusCode::CREATED;
        response.headers_mut().insert("x-a", HeaderValue::from_static("1"));

        let (response, pending) = capture(response, 1024);
        assert_eq!(response.headers().get("x-a").unwrap(), "1");
        assert_eq!(&read(response).await.unwrap()[..], b"payload");

        let copy = pending.finish().await.unwrap();
        assert_eq!(copy.status, StatusCode::CREATED);
        assert_eq!(&copy.body[..], b"payload");
        assert_eq!(copy.into_response().status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_capture_over_limit_streams_without_copy() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"0123456789")), Ok(Bytes::from_static(b"abcdef"))];
        let response = Response::new(Body::from_stream(futures_util::stream::iter(chunks)));

        let (response, pending) = capture(response, 12);
        assert_eq!(&read(response).await.unwrap()[..], b"0123456789abcdef");
        assert!(pending.finish().await.is_none());
    }

    #[tokio::test]
    async fn test_capture_passes_body_errors_through() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let response = Response::new(Body::from_stream(futures_util::stream::iter(chunks)));

        let (response, pending) = capture(response, 1024);
        assert!(read(response).await.is_err());
        assert!(pending.finish().await.is_none());
    }

    #[tokio::test]
    async fn test_capture_dropped_body_is_not_kept() {
        let (response, pending) = capture(Response::new(Body::from("unread")), 1024);
        drop(response);
        assert!(pending.finish().await.is_none());
    }
}
