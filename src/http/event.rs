//! Handler contract shared by every component.
//!
//! # Responsibilities
//! - Carry the in-flight request together with a background-task handle
//! - Define `ServeFunction`, the async request → response contract
//! - Track fire-and-forget work the host must finish before exiting
//!
//! # Design Decisions
//! - Events are replaced by copy-construction (`with_request`), never
//!   patched in place
//! - No global listener registry; the server owns dispatch

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::{BoxFuture, FutureExt};
use tokio_util::task::TaskTracker;

use crate::http::response::ServeError;

/// Future returned by a [`ServeFunction`].
pub type ServeFuture = BoxFuture<'static, Result<Response<Body>, ServeError>>;

/// Background work registered by handlers.
///
/// Cloning shares the same tracker. The host closes and drains it on
/// shutdown, so registered tasks are not dropped when responding early.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` without delaying the response.
    pub fn wait_until<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Number of tasks still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting tasks and wait for the registered ones to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// An inbound request plus the hooks the host exposes to handlers.
#[derive(Debug)]
pub struct FetchEvent {
    request: Request<Body>,
    tasks: BackgroundTasks,
}

impl FetchEvent {
    /// The request URI is expected to be absolute (scheme and authority set).
    pub fn new(request: Request<Body>, tasks: BackgroundTasks) -> Self {
        Self { request, tasks }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Register background work on the host.
    pub fn wait_until<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.wait_until(task);
    }

    /// A new event carrying `request` and the same background-task handle.
    pub fn with_request(self, request: Request<Body>) -> Self {
        Self {
            request,
            tasks: self.tasks,
        }
    }

    pub fn into_parts(self) -> (Request<Body>, BackgroundTasks) {
        (self.request, self.tasks)
    }

    pub fn into_request(self) -> Request<Body> {
        self.request
    }
}

/// Async handler from a [`FetchEvent`] to a response.
#[derive(Clone)]
pub struct ServeFunction {
    inner: Arc<dyn Fn(FetchEvent) -> ServeFuture + Send + Sync>,
}

impl ServeFunction {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(FetchEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<Body>, ServeError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |event| f(event).boxed()),
        }
    }

    pub fn call(&self, event: FetchEvent) -> ServeFuture {
        (self.inner)(event)
    }
}

impl fmt::Debug for ServeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServeFunction")
    }
}
