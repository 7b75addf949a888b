//! Upstream naming for a hosting project.

use url::Url;

use crate::proxy::ProxyError;

/// Paths under this prefix always go to hosting.
pub const RESERVED_PREFIX: &str = "/__/";

pub fn is_reserved(path: &str) -> bool {
    path.starts_with(RESERVED_PREFIX)
}

/// `https://<project>.firebaseapp.com/`
pub fn hosting_endpoint(project_id: &str) -> Result<Url, ProxyError> {
    parse(format!("https://{}.firebaseapp.com/", project_id))
}

/// `https://us-central1-<project>.cloudfunctions.net/`
pub fn function_host(project_id: &str) -> Result<Url, ProxyError> {
    parse(format!("https://us-central1-{}.cloudfunctions.net/", project_id))
}

/// A function name is a single path segment: no separators, no scheme,
/// no query or fragment, and not a dot segment.
pub fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '?' | '#' | '%') || c.is_whitespace())
}

/// `https://us-central1-<project>.cloudfunctions.net/<name>`
pub fn function_endpoint(project_id: &str, name: &str) -> Result<Url, ProxyError> {
    if !is_valid_function_name(name) {
        return Err(ProxyError::InvalidFunctionName(name.to_string()));
    }
    let host = function_host(project_id)?;
    host.join(name)
        .map_err(|e| ProxyError::InvalidUpstream(format!("{}{}", host, name), e))
}

fn parse(url: String) -> Result<Url, ProxyError> {
    Url::parse(&url).map_err(|e| ProxyError::InvalidUpstream(url, e))
}
