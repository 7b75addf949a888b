//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → request.rs (absolute URI, request ID, hostname)
//!     → event.rs (FetchEvent + background tasks → ServeFunction)
//!     → response.rs (errors and unrouted requests become 500s)
//!     → Send to client
//! ```

pub mod event;
pub mod request;
pub mod response;
pub mod server;

pub use event::{BackgroundTasks, FetchEvent, ServeFunction};
pub use request::X_REQUEST_ID;
pub use response::ServeError;
pub use server::HttpServer;
