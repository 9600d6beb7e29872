//! Event publishing endpoint.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chronicle_core::metrics::increment;
use chronicle_core::Event;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /publish`.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishResponse {
    pub status: &'static str,
    pub message: String,
    pub events_count: usize,
}

/// `POST /publish`
///
/// Queues a batch of events. Only shape and types are checked while
/// decoding; a body that does not decode is rejected with 422 and nothing
/// is queued. Empty strings are accepted for every field.
pub async fn publish(
    State(state): State<AppState>,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<Json<PublishResponse>, ApiError> {
    increment("publish_requests_total", 1);

    let Json(request) = body?;

    let count = state.aggregator.submit_batch(request.events)?;
    increment("publish_events_total", count as u64);
    tracing::debug!(count, "events published");

    Ok(Json(PublishResponse {
        status: "success",
        message: format!("Published {} events", count),
        events_count: count,
    }))
}
