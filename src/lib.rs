//! Rewrite matching and edge routing engine.

pub mod cache;
pub mod config;
pub mod firebase;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod routing;

pub use config::schema::FirecloudConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
