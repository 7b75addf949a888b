//! Hosting endpoint resolver.
//!
//! # Responsibilities
//! - Map a request to its upstream: a named function, the public
//!   endpoint, or the hosting fallback
//! - Rewrite URLs matching destination rules before they are proxied
//! - Assemble the serve pipeline: cache → proxy → global headers
//!
//! # Data Flow
//! ```text
//! FetchEvent
//!     → CachingProxy (when a store is configured)
//!     → proxy(endpoint, rewrite_url)
//!     → global response headers (configured values win)
//!     → Err becomes a 500 carrying the diagnostic
//! ```
//!
//! # Design Decisions
//! - `/__/` is checked before any rule, so reserved paths always reach hosting
//! - Function URLs are built at construction; resolving never fails

pub mod urls;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use thiserror::Error;
use url::Url;

use crate::cache::{CacheStore, CachingProxy, MemoryCache, DEFAULT_MAX_CACHE_BYTES, DEFAULT_SEED};
use crate::http::event::{FetchEvent, ServeFunction};
use crate::http::response::{failure, ServeError};
use crate::proxy::{self, picker, patch_response, Fetch, HeaderChanges, ProxyError, ProxyOptions};
use crate::routing::{GlobError, RewriteRule, RewriteTarget, RuleMatcher};

/// Errors raised while building a resolver.
#[derive(Debug, Error)]
pub enum FirebaseError {
    #[error("Invalid rewrite source: {0}")]
    Rule(#[from] GlobError),

    #[error(transparent)]
    Upstream(#[from] ProxyError),
}

/// The `hosting` section of a project's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostingConfig {
    pub rewrites: Vec<RewriteRule>,
}

/// Optional behaviour on top of rule-based routing.
#[derive(Clone)]
pub struct ExtraOptions {
    /// Header changes applied to every response.
    pub headers: HeaderChanges,
    /// Vary-hash seed; changing it invalidates every cached entry.
    pub seed: String,
    /// Upstream for requests no function rule claims.
    pub public_endpoint: Option<Url>,
    pub proxy: ProxyOptions,
    /// `None` disables caching.
    pub cache: Option<Arc<dyn CacheStore>>,
    /// Largest response body copied into the cache.
    pub max_cache_bytes: usize,
}

impl Default for ExtraOptions {
    fn default() -> Self {
        Self {
            headers: HeaderChanges::new(),
            seed: DEFAULT_SEED.to_string(),
            public_endpoint: None,
            proxy: ProxyOptions::default(),
            cache: Some(Arc::new(MemoryCache::new())),
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
        }
    }
}

impl fmt::Debug for ExtraOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtraOptions")
            .field("headers", &self.headers)
            .field("seed", &self.seed)
            .field("public_endpoint", &self.public_endpoint)
            .field("proxy", &self.proxy)
            .field("cache", &self.cache.is_some())
            .field("max_cache_bytes", &self.max_cache_bytes)
            .finish()
    }
}

/// Rule-based resolver for one hosting project.
#[derive(Debug)]
pub struct Firebase {
    project_id: String,
    matcher: RuleMatcher,
    hosting: Url,
    functions: HashMap<String, Url>,
    extra: ExtraOptions,
}

impl Firebase {
    pub fn new(project_id: &str, config: &HostingConfig, extra: ExtraOptions) -> Result<Self, FirebaseError> {
        let matcher = RuleMatcher::new(&config.rewrites)?;
        let hosting = urls::hosting_endpoint(project_id)?;

        let mut functions = HashMap::new();
        for rule in &config.rewrites {
            if let RewriteTarget::Function { name } = &rule.target {
                if !functions.contains_key(name) {
                    functions.insert(name.clone(), urls::function_endpoint(project_id, name)?);
                }
            }
        }

        tracing::info!(
            project_id = %project_id,
            rules = matcher.len(),
            functions = functions.len(),
            public_endpoint = ?extra.public_endpoint.as_ref().map(Url::as_str),
            "Hosting resolver ready"
        );

        Ok(Self {
            project_id: project_id.to_string(),
            matcher,
            hosting,
            functions,
            extra,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Upstream base URL for `request`.
    pub fn endpoint<B>(&self, request: &Request<B>) -> Url {
        let path = request.uri().path();
        if urls::is_reserved(path) {
            return self.hosting.clone();
        }

        match self.matcher.match_path(path) {
            Some(RewriteTarget::Function { name }) => match self.functions.get(name) {
                Some(url) => url.clone(),
                None => self.fallback(),
            },
            Some(RewriteTarget::Destination { .. }) | None => self.fallback(),
        }
    }

    /// `url` with its path replaced when a destination rule claims it.
    pub fn rewrite_url(&self, mut url: Url) -> Url {
        if urls::is_reserved(url.path()) {
            return url;
        }
        if let Some(RewriteTarget::Destination { path }) = self.matcher.match_path(url.path()) {
            url.set_path(path);
        }
        url
    }

    fn fallback(&self) -> Url {
        self.extra
            .public_endpoint
            .clone()
            .unwrap_or_else(|| self.hosting.clone())
    }

    /// Serve pipeline sending requests through `client`.
    pub fn into_serve(self, client: Arc<dyn Fetch>) -> ServeFunction {
        let headers = self.extra.headers.clone();
        let cache = self
            .extra
            .cache
            .clone()
            .map(|store| CachingProxy::new(store, &self.extra.seed).with_max_bytes(self.extra.max_cache_bytes));
        let resolver = Arc::new(self);

        let pick = {
            let resolver = resolver.clone();
            picker::custom(move |request: &Request<Body>| resolver.endpoint(request))
        };
        let options = {
            let resolver = resolver.clone();
            let base = resolver.extra.proxy.clone();
            let then = base.rewrite_url.clone();
            base.with_rewrite_url(move |url| {
                let url = resolver.rewrite_url(url);
                match &then {
                    Some(rewrite) => rewrite(url),
                    None => url,
                }
            })
        };

        let mut handler = proxy::proxy(pick, client, options);
        if let Some(cache) = cache {
            handler = cache.wrap(handler);
        }

        ServeFunction::new(move |event: FetchEvent| {
            let handler = handler.clone();
            let headers = headers.clone();
            async move { Ok(finish(handler.call(event).await, &headers)) }
        })
    }
}

/// Apply global headers, or turn the failure into a 500.
fn finish(result: Result<Response<Body>, ServeError>, headers: &HeaderChanges) -> Response<Body> {
    match result {
        Ok(response) => patch_response(response, headers),
        Err(err) => failure(&err),
    }
}

/// Resolver pipeline for `project_id` in one call.
pub fn serve(
    project_id: &str,
    config: &HostingConfig,
    client: Arc<dyn Fetch>,
    extra: ExtraOptions,
) -> Result<ServeFunction, FirebaseError> {
    Ok(Firebase::new(project_id, config, extra)?.into_serve(client))
}
