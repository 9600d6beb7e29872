//! Event query endpoint.

use axum::Json;
use axum::extract::{Query, State};
use chronicle_core::Event;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct EventsQuery {
    /// Restrict results to one topic.
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventsResponse {
    pub count: usize,
    pub events: Vec<Event>,
}

/// `GET /events?topic=`
///
/// Accepted events for `topic`, or every accepted event when it is absent.
/// An unknown topic yields an empty list.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let events = match query.topic.as_deref() {
        Some(topic) => state.aggregator.query_by_topic(topic),
        None => state.aggregator.query_all(),
    };

    Json(EventsResponse {
        count: events.len(),
        events,
    })
}
