//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Rewrite rules (hosting config)
//!     → glob.rs (compile sources, fail fast)
//!     → matcher.rs (exact table + ordered glob list)
//!     → Return: RewriteTarget or no match
//!
//! Incoming Request (host, method, path)
//!     → router.rs (selectors in insertion order, mounts, root trimming)
//!     → ServeFunction of the first matching route, or 500 "unrouted"
//! ```
//!
//! # Design Decisions
//! - Patterns compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (insertion order), except exact rewrite sources,
//!   which always beat globs

pub mod glob;
pub mod matcher;
pub mod router;

pub use glob::{is_pattern, Glob, GlobError};
pub use matcher::{RewriteRule, RewriteTarget, RuleMatcher};
pub use router::{App, RouteBuilder};
