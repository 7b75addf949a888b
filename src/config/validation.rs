//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check rewrite rules: exactly one target, sources compile
//! - Convert validated sections into runtime types
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FirecloudConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::config::schema::{FirebaseConfig, FirecloudConfig, RewriteConfig};
use crate::firebase::{urls, HostingConfig};
use crate::proxy::HeaderChanges;
use crate::routing::{Glob, GlobError, RewriteRule};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("observability.log_level '{0}' is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("limits.max_body_bytes must be greater than zero")]
    ZeroBodyLimit,

    #[error("cache.seed must not be empty")]
    EmptySeed,

    #[error("firebase.project_id is required")]
    MissingProjectId,

    #[error("firebase.domain '{pattern}' is invalid: {error}")]
    InvalidDomain { pattern: String, error: GlobError },

    #[error("firebase.public_endpoint '{0}' is not a URL")]
    InvalidPublicEndpoint(String),

    #[error("firebase header '{0}' is invalid")]
    InvalidHeader(String),

    #[error("rewrite '{0}' sets both function and destination")]
    AmbiguousRewrite(String),

    #[error("rewrite '{0}' sets neither function nor destination")]
    MissingRewriteTarget(String),

    #[error("rewrite '{pattern}' has an invalid source: {error}")]
    InvalidRewriteSource { pattern: String, error: GlobError },

    #[error("rewrite '{pattern}' names invalid function '{name}'")]
    InvalidFunctionName { pattern: String, name: String },

    #[error("{0} must be greater than zero")]
    ZeroCacheLimit(&'static str),
}

/// Check every section, collecting all problems.
pub fn validate_config(config: &FirecloudConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(observability.metrics_address.clone()));
    }
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::InvalidLogLevel(observability.log_level.clone()));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if config.cache.enabled {
        if config.cache.seed.is_empty() {
            errors.push(ValidationError::EmptySeed);
        }
        if config.cache.max_entries == 0 {
            errors.push(ValidationError::ZeroCacheLimit("cache.max_entries"));
        }
        if config.cache.default_ttl_secs == 0 {
            errors.push(ValidationError::ZeroCacheLimit("cache.default_ttl_secs"));
        }
        if config.limits.max_cache_bytes == 0 {
            errors.push(ValidationError::ZeroCacheLimit("limits.max_cache_bytes"));
        }
    }

    validate_firebase(&config.firebase, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_firebase(firebase: &FirebaseConfig, errors: &mut Vec<ValidationError>) {
    if firebase.project_id.trim().is_empty() {
        errors.push(ValidationError::MissingProjectId);
    }
    if let Some(domain) = &firebase.domain {
        if let Err(error) = Glob::host(domain) {
            errors.push(ValidationError::InvalidDomain {
                pattern: domain.clone(),
                error,
            });
        }
    }
    if let Err(e) = public_endpoint(firebase) {
        errors.push(e);
    }
    if let Err(e) = header_changes(firebase) {
        errors.push(e);
    }
    for rewrite in &firebase.rewrites {
        if let Err(e) = rewrite_rule(rewrite) {
            errors.push(e);
        }
    }
}

/// Convert one configured rewrite into a rule, compiling its source.
pub fn rewrite_rule(rewrite: &RewriteConfig) -> Result<RewriteRule, ValidationError> {
    if let Err(error) = Glob::path(&rewrite.source) {
        return Err(ValidationError::InvalidRewriteSource {
            pattern: rewrite.source.clone(),
            error,
        });
    }

    match (&rewrite.function, &rewrite.destination) {
        (Some(name), None) if !urls::is_valid_function_name(name) => Err(ValidationError::InvalidFunctionName {
            pattern: rewrite.source.clone(),
            name: name.clone(),
        }),
        (Some(name), None) => Ok(RewriteRule::function(&rewrite.source, name)),
        (None, Some(path)) => Ok(RewriteRule::destination(&rewrite.source, path)),
        (Some(_), Some(_)) => Err(ValidationError::AmbiguousRewrite(rewrite.source.clone())),
        (None, None) => Err(ValidationError::MissingRewriteTarget(rewrite.source.clone())),
    }
}

/// The hosting rules of a validated section.
pub fn hosting_config(firebase: &FirebaseConfig) -> Result<HostingConfig, ValidationError> {
    let rewrites = firebase
        .rewrites
        .iter()
        .map(rewrite_rule)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HostingConfig { rewrites })
}

pub fn public_endpoint(firebase: &FirebaseConfig) -> Result<Option<Url>, ValidationError> {
    firebase
        .public_endpoint
        .as_deref()
        .map(|raw| Url::parse(raw).map_err(|_| ValidationError::InvalidPublicEndpoint(raw.to_string())))
        .transpose()
}

/// Response header changes: configured values set, `remove_headers` deleted.
pub fn header_changes(firebase: &FirebaseConfig) -> Result<HeaderChanges, ValidationError> {
    let mut changes = HeaderChanges::new();
    for (name, value) in &firebase.headers {
        let header = HeaderName::try_from(name.as_str())
            .map_err(|_| ValidationError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::try_from(value.as_str())
            .map_err(|_| ValidationError::InvalidHeader(name.clone()))?;
        changes.insert(header, Some(value));
    }
    for name in &firebase.remove_headers {
        let header = HeaderName::try_from(name.as_str())
            .map_err(|_| ValidationError::InvalidHeader(name.clone()))?;
        changes.insert(header, None);
    }
    Ok(changes)
}
