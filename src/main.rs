//! Firecloud edge router.
//!
//! Serves a hosting project from the edge: requests are matched against the
//! project's rewrite rules and proxied to a named function, the public
//! endpoint or the hosting site, through a vary-aware response cache.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ route table ──▶ cache ──▶ resolver ──▶ proxy ──▶ Upstream
//!                    (request id,    (domain/root   (vary     (rules,      (url +
//!                     trace,          gate)          hash)     /__/)        headers)
//!                     timeout)
//!
//!     Cross-cutting: config (TOML + firebase.json), observability (tracing,
//!     Prometheus), lifecycle (signals, graceful shutdown, task drain)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use firecloud::config::load_config;
use firecloud::lifecycle::{build_handler, signals, Shutdown};
use firecloud::observability::{logging, metrics};
use firecloud::HttpServer;

#[derive(Parser)]
#[command(name = "firecloud")]
#[command(about = "Edge router for hosting projects", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "firecloud.toml")]
    config: PathBuf,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);
    tracing::info!("firecloud v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        project_id = %config.firebase.project_id,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    error = %e,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let handler = build_handler(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(&config, handler, shutdown);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
