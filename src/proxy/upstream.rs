//! Request rewriting towards an upstream.
//!
//! # Responsibilities
//! - Splice the (optionally rewritten) original path onto the upstream URL
//! - Apply the host header policy (`X-Forwarded-*` or original `Host`)
//! - Run the caller's header hook last, over everything else
//!
//! # Design Decisions
//! - Scheme and authority always come from the upstream; with
//!   `HostPolicy::Original` the connection goes to the upstream while the
//!   original hostname is sent as `Host`
//! - Hop-by-hop headers are never forwarded

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Request, Uri};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::request::url_of;
use crate::proxy::patch::{strip_hop_by_hop, HeaderChanges};
use crate::proxy::ProxyError;

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// How the original host is presented to the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPolicy {
    /// `Host` becomes the upstream's; the original goes in `X-Forwarded-Host`.
    #[default]
    XForwarded,
    /// `Host` stays the original hostname (virtual-hosted upstreams).
    Original,
}

/// Computes extra header changes from the inbound request.
pub type HeaderHook = Arc<dyn Fn(&Request<Body>) -> HeaderChanges + Send + Sync>;

/// Rewrites the original URL before it is spliced onto the upstream.
pub type UrlHook = Arc<dyn Fn(Url) -> Url + Send + Sync>;

/// Options controlling [`to_upstream`].
#[derive(Clone, Default)]
pub struct ProxyOptions {
    pub host: HostPolicy,
    pub headers: Option<HeaderHook>,
    pub rewrite_url: Option<UrlHook>,
}

impl ProxyOptions {
    pub fn with_host(mut self, host: HostPolicy) -> Self {
        self.host = host;
        self
    }

    pub fn with_headers<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request<Body>) -> HeaderChanges + Send + Sync + 'static,
    {
        self.headers = Some(Arc::new(hook));
        self
    }

    pub fn with_rewrite_url<F>(mut self, hook: F) -> Self
    where
        F: Fn(Url) -> Url + Send + Sync + 'static,
    {
        self.rewrite_url = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ProxyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyOptions")
            .field("host", &self.host)
            .field("headers", &self.headers.is_some())
            .field("rewrite_url", &self.rewrite_url.is_some())
            .finish()
    }
}

/// Rewrite `request` so it targets `upstream`.
pub fn to_upstream(
    request: Request<Body>,
    upstream: &Url,
    options: &ProxyOptions,
) -> Result<Request<Body>, ProxyError> {
    let base = url_of(&request)?;
    let original = match &options.rewrite_url {
        Some(rewrite) => rewrite(base),
        None => base,
    };

    let mut url = upstream.clone();
    url.set_path(&join_paths(upstream.path(), original.path()));
    url.set_query(original.query());
    url.set_fragment(None);

    let original_host = original.host_str().unwrap_or_default();
    let host_headers = match options.host {
        HostPolicy::XForwarded => HeaderChanges::new()
            .remove(header::HOST)
            .set(X_FORWARDED_HOST, header_value(original_host)?)
            .set(X_FORWARDED_PROTO, header_value(original.scheme())?),
        HostPolicy::Original => HeaderChanges::new().set(header::HOST, header_value(original_host)?),
    };
    let custom = options
        .headers
        .as_ref()
        .map(|hook| hook(&request))
        .unwrap_or_default();
    let changes = host_headers.merge(&custom);

    let (mut parts, body) = request.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    changes.apply(&mut parts.headers);
    parts.uri = url.as_str().parse::<Uri>()?;

    Ok(Request::from_parts(parts, body))
}

fn header_value(value: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(value).map_err(|_| ProxyError::InvalidHeader(value.to_string()))
}

/// `upstream_path + original_path`, with a single slash at the seam.
fn join_paths(upstream_path: &str, original_path: &str) -> String {
    let prefix = upstream_path.trim_end_matches('/');
    let suffix = if original_path.starts_with('/') {
        original_path.to_string()
    } else {
        format!("/{}", original_path)
    };
    format!("{}{}", prefix, suffix)
}
