//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with a catch-all handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Hand every request to the configured `ServeFunction` as a `FetchEvent`
//! - Drain background tasks after the listener stops

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::FirecloudConfig;
use crate::http::event::{BackgroundTasks, FetchEvent, ServeFunction};
use crate::http::request::{absolutize, request_id, MakeRequestUuid, X_REQUEST_ID};
use crate::http::response::into_response;
use crate::lifecycle::Shutdown;
use crate::observability::{metrics, tracing::make_span};

/// Scheme assumed when the edge in front does not send `X-Forwarded-Proto`.
const DEFAULT_SCHEME: &str = "http";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: ServeFunction,
    pub tasks: BackgroundTasks,
}

/// HTTP server hosting one `ServeFunction`.
pub struct HttpServer {
    router: Router,
    tasks: BackgroundTasks,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &FirecloudConfig, handler: ServeFunction, shutdown: Shutdown) -> Self {
        let tasks = BackgroundTasks::new();
        let state = AppState {
            handler,
            tasks: tasks.clone(),
        };

        let router = Self::build_router(config, state);
        Self {
            router,
            tasks,
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &FirecloudConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(serve_handler))
            .route("/", any(serve_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| make_span(request)))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// Background tasks registered by handlers.
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Run the server until shutdown is triggered, then drain background tasks.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut rx = self.shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
                tracing::info!("Stopping listener");
            })
            .await?;

        tracing::info!(pending = self.tasks.pending(), "Draining background tasks");
        self.tasks.drain().await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: wrap the request in a `FetchEvent` and serve it.
async fn serve_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let method = request.method().to_string();
    let request = absolutize(request, DEFAULT_SCHEME);

    tracing::debug!(
        request_id = %request_id(&request),
        method = %method,
        uri = %request.uri(),
        "Serving request"
    );

    let event = FetchEvent::new(request, state.tasks.clone());
    let response = into_response(state.handler.call(event).await);

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}
