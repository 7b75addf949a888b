//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated configuration into the top-level `ServeFunction`
//! - Build the upstream client, cache store and resolver in order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The resolver is mounted in a route table, gated by the configured
//!   domain and root; anything else gets the unrouted 500

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{CacheStore, MemoryCache};
use crate::config::schema::FirecloudConfig;
use crate::config::validation::{self, ValidationError};
use crate::firebase::{ExtraOptions, Firebase, FirebaseError};
use crate::http::event::ServeFunction;
use crate::proxy::{Fetch, HttpClient, ProxyError, ProxyOptions};
use crate::routing::{App, GlobError};

/// Errors raised while assembling the engine.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ValidationError),

    #[error(transparent)]
    Resolver(#[from] FirebaseError),

    #[error("Failed to build upstream client: {0}")]
    Client(#[from] ProxyError),

    #[error("Invalid route: {0}")]
    Route(#[from] GlobError),
}

/// Top-level handler for `config`, talking to upstreams over HTTP.
pub fn build_handler(config: &FirecloudConfig) -> Result<ServeFunction, StartupError> {
    let client = HttpClient::new(
        Duration::from_secs(config.timeouts.connect_secs),
        config.limits.max_body_bytes,
    )?;
    build_handler_with(config, Arc::new(client))
}

/// [`build_handler`] with a caller-supplied upstream client.
pub fn build_handler_with(
    config: &FirecloudConfig,
    client: Arc<dyn Fetch>,
) -> Result<ServeFunction, StartupError> {
    let firebase = &config.firebase;
    let hosting = validation::hosting_config(firebase)?;
    let cache: Option<Arc<dyn CacheStore>> = if config.cache.enabled {
        Some(Arc::new(MemoryCache::with_limits(
            config.cache.max_entries,
            Duration::from_secs(config.cache.default_ttl_secs),
        )))
    } else {
        None
    };
    let extra = ExtraOptions {
        headers: validation::header_changes(firebase)?,
        seed: config.cache.seed.clone(),
        public_endpoint: validation::public_endpoint(firebase)?,
        proxy: ProxyOptions::default().with_host(config.proxy.host),
        cache,
        max_cache_bytes: config.limits.max_cache_bytes,
    };
    let resolver = Firebase::new(&firebase.project_id, &hosting, extra)?.into_serve(client);

    let mut app = App::new();
    let mut route = app.route();
    if let Some(domain) = &firebase.domain {
        route = route.domain(domain);
    }
    if let Some(root) = &firebase.root {
        route = route.root(root);
    }
    route.serve(resolver)?;

    tracing::info!(
        domain = firebase.domain.as_deref().unwrap_or("*"),
        root = firebase.root.as_deref().unwrap_or("/"),
        cache = config.cache.enabled,
        host_policy = ?config.proxy.host,
        "Engine assembled"
    );
    Ok(app.into_serve())
}
