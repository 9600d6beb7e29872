//! Chronicle Serve - HTTP API server for the Chronicle aggregator.
//!
//! This binary opens the dedup store, starts the consumer loop and serves
//! the publish/query API until interrupted, then drains and closes the
//! store.

use anyhow::Context;
use axum::http::Request;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use chronicle_core::metrics::{init_metrics, start_metrics_server};
use chronicle_serve::{AppState, Config, router};

/// Chronicle API server.
#[derive(Parser, Debug)]
#[command(name = "chronicle-serve")]
#[command(about = "HTTP API server for the Chronicle event aggregator", long_about = None)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load .env file if it exists
    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)?;
        eprintln!("Loaded environment from {}", args.dotenv);
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = AppState::new(Config::from_env()?);
    let bind_addr = state.config.bind_addr.clone();

    if state.config.metrics_port > 0 {
        let handle = init_metrics();
        start_metrics_server(state.config.metrics_port, handle)
            .await
            .context("Failed to start metrics server")?;
    }

    let aggregator = state.aggregator.clone();

    aggregator
        .initialize()
        .context("Failed to initialize dedup store")?;
    aggregator.start().await?;

    let app = router(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    query = request.uri().query().unwrap_or("")
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!(addr = %bind_addr, "starting server");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!(pending = aggregator.queue_depth(), "shutting down");
    aggregator.close().await?;

    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
