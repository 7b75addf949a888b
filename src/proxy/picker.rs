//! Upstream selection.
//!
//! Trivial strategies only: a fixed upstream, round-robin rotation, and
//! uniform random choice. Anything smarter belongs to an outer layer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use url::Url;

use crate::proxy::ProxyError;

/// Picks the upstream base URL for a request.
pub type Picker = Arc<dyn Fn(&Request<Body>) -> Url + Send + Sync>;

/// Picker from an arbitrary function.
pub fn custom<F>(f: F) -> Picker
where
    F: Fn(&Request<Body>) -> Url + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Always the same upstream.
pub fn to(upstream: &str) -> Result<Picker, ProxyError> {
    let url = parse_upstream(upstream)?;
    Ok(Arc::new(move |_| url.clone()))
}

/// Rotate through `upstreams` in order.
pub fn round_robin<I, S>(upstreams: I) -> Result<Picker, ProxyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let urls = parse_all(upstreams)?;
    let counter = AtomicUsize::new(0);
    Ok(Arc::new(move |_| {
        let index = counter.fetch_add(1, Ordering::Relaxed) % urls.len();
        urls[index].clone()
    }))
}

/// Uniformly random upstream per request.
pub fn random<I, S>(upstreams: I) -> Result<Picker, ProxyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let urls = parse_all(upstreams)?;
    Ok(Arc::new(move |_| urls[fastrand::usize(..urls.len())].clone()))
}

fn parse_upstream(upstream: &str) -> Result<Url, ProxyError> {
    Url::parse(upstream).map_err(|e| ProxyError::InvalidUpstream(upstream.to_string(), e))
}

fn parse_all<I, S>(upstreams: I) -> Result<Vec<Url>, ProxyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let urls = upstreams
        .into_iter()
        .map(|u| parse_upstream(u.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    if urls.is_empty() {
        return Err(ProxyError::NoUpstreams);
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request<Body> {
        Request::builder().uri("https://a.com/").body(Body::empty()).unwrap()
    }

    #[test]
    fn test_round_robin() {
        let pick = round_robin(["https://one.com", "https://two.com"]).unwrap();
        let req = request();

        assert_eq!(pick(&req).host_str(), Some("one.com"));
        assert_eq!(pick(&req).host_str(), Some("two.com"));
        assert_eq!(pick(&req).host_str(), Some("one.com"));
    }

    #[test]
    fn test_random_stays_in_set() {
        let pick = random(vec!["https://one.com".to_string(), "https://two.com".to_string()]).unwrap();
        let req = request();
        for _ in 0..20 {
            let host = pick(&req).host_str().map(str::to_string);
            assert!(matches!(host.as_deref(), Some("one.com") | Some("two.com")));
        }
    }

    #[test]
    fn test_static_and_errors() {
        let pick = to("https://static.com/base").unwrap();
        assert_eq!(pick(&request()).path(), "/base");

        assert!(matches!(round_robin(Vec::<String>::new()), Err(ProxyError::NoUpstreams)));
        assert!(matches!(to("not a url"), Err(ProxyError::InvalidUpstream(..))));
    }
}
