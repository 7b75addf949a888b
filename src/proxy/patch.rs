//! Header patching.
//!
//! # Responsibilities
//! - Describe a set of header changes (`value` = set, `None` = delete)
//! - Apply changes to requests and responses deterministically
//! - Strip hop-by-hop headers when forwarding
//!
//! # Design Decisions
//! - Changes apply in sorted header-name order, so the result never
//!   depends on declaration order
//! - Names and values are validated when the change set is built, so
//!   applying it cannot fail

use std::collections::BTreeMap;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Response};
use thiserror::Error;

/// Invalid header name or value in a change set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Invalid header name: {0}")]
    Name(String),

    #[error("Invalid value for header {0}")]
    Value(String),
}

/// Headers that only make sense on a single connection.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// An ordered set of header changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderChanges {
    // Keyed by the lowercase header name so iteration is sorted
    changes: BTreeMap<String, (HeaderName, Option<HeaderValue>)>,
}

impl HeaderChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any existing values.
    pub fn set(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.insert(name, Some(value));
        self
    }

    /// Delete `name`.
    pub fn remove(mut self, name: HeaderName) -> Self {
        self.insert(name, None);
        self
    }

    pub fn insert(&mut self, name: HeaderName, value: Option<HeaderValue>) {
        self.changes
            .insert(name.as_str().to_string(), (name, value));
    }

    /// Combine two change sets, `other` taking precedence on conflicts.
    pub fn merge(mut self, other: &HeaderChanges) -> Self {
        for (key, change) in &other.changes {
            self.changes.insert(key.clone(), change.clone());
        }
        self
    }

    /// Apply the changes to `headers` in sorted key order.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in self.changes.values() {
            match value {
                Some(value) => {
                    headers.insert(name.clone(), value.clone());
                }
                None => {
                    headers.remove(name);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

impl TryFrom<BTreeMap<String, Option<String>>> for HeaderChanges {
    type Error = HeaderError;

    fn try_from(map: BTreeMap<String, Option<String>>) -> Result<Self, Self::Error> {
        let mut changes = HeaderChanges::new();
        for (name, value) in map {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| HeaderError::Name(name.clone()))?;
            let header_value = value
                .map(|v| HeaderValue::from_str(&v).map_err(|_| HeaderError::Value(name.clone())))
                .transpose()?;
            changes.insert(header_name, header_value);
        }
        Ok(changes)
    }
}

/// Return `response` with `changes` applied to its headers.
pub fn patch_response<B>(mut response: Response<B>, changes: &HeaderChanges) -> Response<B> {
    changes.apply(response.headers_mut());
    response
}

/// Remove hop-by-hop headers, including those named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
