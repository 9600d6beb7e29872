//! Aggregate statistics endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub received: u64,
    pub unique_processed: u64,
    pub duplicated_dropped: u64,
    pub topics: Vec<String>,
    /// Whole seconds since the consumer first started.
    pub uptime: u64,
}

/// `GET /stats`
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.aggregator.get_stats();

    Json(StatsResponse {
        received: stats.received,
        unique_processed: stats.unique_processed,
        duplicated_dropped: stats.duplicated_dropped,
        topics: stats.topics,
        uptime: stats.uptime_seconds as u64,
    })
}
