//! Prometheus metrics helpers for Chronicle.
//!
//! This module provides centralized metrics initialization and the metric
//! descriptions shared by the ingestion pipeline and the HTTP transport.
//!
//! # Usage
//!
//! ```rust,ignore
//! use chronicle_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     metrics::counter!("ingest_events_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`ingest_`, `publish_`, `dedupe_`)
//! - Suffix: unit or type (`_total` for counters)

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at startup before any metrics are recorded.
///
/// # Panics
///
/// Panics if a recorder is already installed.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_common_metrics();
    Some(handle)
}

/// Start the Prometheus metrics HTTP server.
///
/// Binds `0.0.0.0:port` and serves `/metrics` from a background task. The
/// bind happens before returning so a port conflict surfaces to the caller.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(())
}

/// Register descriptions for the metrics Chronicle emits.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    // =========================================================================
    // Ingestion
    // =========================================================================

    describe_counter!(
        "ingest_events_total",
        "Events dequeued and inspected by the consumer loop"
    );
    describe_counter!(
        "ingest_events_unique_total",
        "Events accepted as unique and persisted"
    );
    describe_counter!(
        "ingest_events_duplicate_total",
        "Events dropped as duplicates"
    );
    describe_counter!(
        "ingest_events_failed_total",
        "Events dropped because processing failed"
    );
    describe_gauge!("ingest_queue_depth", "Events waiting in the inbound queue");
    describe_gauge!(
        "ingest_running",
        "Whether the consumer loop is running (1=yes, 0=no)"
    );

    // =========================================================================
    // Dedup store
    // =========================================================================

    describe_gauge!("dedupe_keys", "Dedup keys in the processed set");

    // =========================================================================
    // Transport
    // =========================================================================

    describe_counter!("publish_requests_total", "Publish requests received");
    describe_counter!(
        "publish_events_total",
        "Events enqueued through the publish endpoint"
    );
}

/// Increment a counter.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Set a gauge value.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}
