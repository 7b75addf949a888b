//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::store::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::cache::{DEFAULT_MAX_CACHE_BYTES, DEFAULT_SEED};
use crate::proxy::HostPolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FirecloudConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Upstream request settings.
    pub proxy: ProxyConfig,

    /// Hosting project and its rewrite rules.
    pub firebase: FirebaseConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest request body forwarded upstream, in bytes.
    pub max_body_bytes: usize,

    /// Largest response body copied into the cache, in bytes.
    pub max_cache_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve GET responses through the in-memory cache.
    pub enabled: bool,

    /// Vary-hash seed. Changing it invalidates every cached entry.
    pub seed: String,

    /// Entries kept before the soonest-expiring one is evicted.
    pub max_entries: usize,

    /// Lifetime of responses without `max-age` or `s-maxage`.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: DEFAULT_SEED.to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl_secs: DEFAULT_TTL.as_secs(),
        }
    }
}

/// Upstream request configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// How the original host is presented upstream.
    pub host: HostPolicy,
}

/// Hosting project configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FirebaseConfig {
    /// Project whose functions and hosting site receive traffic.
    pub project_id: String,

    /// Only serve requests whose host matches this glob (default: any).
    pub domain: Option<String>,

    /// Only serve requests under this path prefix, stripped before resolving.
    pub root: Option<String>,

    /// Upstream for requests no function rule claims (default: hosting).
    pub public_endpoint: Option<String>,

    /// `firebase.json` whose `hosting.rewrites` are appended to `rewrites`.
    /// Relative paths are resolved against the config file's directory.
    pub hosting_file: Option<PathBuf>,

    /// Headers set on every response.
    pub headers: BTreeMap<String, String>,

    /// Headers removed from every response.
    pub remove_headers: Vec<String>,

    /// Rewrite rules, in declaration order.
    pub rewrites: Vec<RewriteConfig>,
}

/// One rewrite rule as written in configuration.
///
/// Exactly one of `function` and `destination` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RewriteConfig {
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

/// The parts of a `firebase.json` file that are read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirebaseJson {
    #[serde(default)]
    pub hosting: HostingJson,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostingJson {
    #[serde(default)]
    pub rewrites: Vec<RewriteConfig>,
}
