//! API route definitions.

mod events;
mod health;
mod publish;
mod stats;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

/// Build the complete API router.
///
/// # Route Structure
///
/// - `GET /` - Banner
/// - `GET /health` - Health check
/// - `POST /publish` - Queue a batch of events
/// - `GET /events` - Accepted events, optionally filtered by `?topic=`
/// - `GET /stats` - Aggregate counters and uptime
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/publish", post(publish::publish))
        .route("/events", get(events::list_events))
        .route("/stats", get(stats::stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chronicle_ingest::IngestConfig;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_state(tmp: &TempDir) -> AppState {
        let state = AppState::new(Config {
            bind_addr: "127.0.0.1:0".to_string(),
            metrics_port: 0,
            ingest: IngestConfig {
                db_path: tmp.path().join("chronicle.db"),
            },
        });
        state.aggregator.initialize().unwrap();
        state.aggregator.start().await.unwrap();
        state
    }

    fn event_json(id: &str, topic: &str) -> Value {
        json!({
            "event_id": id,
            "topic": topic,
            "source": "router-test",
            "payload": {"message": "hello", "timestamp": "2025-03-01T10:00:00Z"},
            "timestamp": "2025-03-01T10:00:00Z"
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn publish_req(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/publish")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let tmp = TempDir::new().unwrap();
        let app = router(test_state(&tmp).await);

        let (status, body) = send(&app, get_req("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Chronicle is running...");

        let (status, body) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "healthy" }));
    }

    #[tokio::test]
    async fn test_publish_then_query() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp).await;
        let app = router(state.clone());

        let events: Vec<_> = (0..10)
            .map(|i| event_json(&(i % 5).to_string(), "logs"))
            .chain([event_json("0", "audit")])
            .collect();
        let (status, body) = send(&app, publish_req(&json!({ "events": events }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Published 11 events");
        assert_eq!(body["events_count"], 11);

        assert!(state.aggregator.wait_idle(Duration::from_secs(10)).await);

        let (status, body) = send(&app, get_req("/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], 11);
        assert_eq!(body["unique_processed"], 6);
        assert_eq!(body["duplicated_dropped"], 5);
        assert_eq!(body["topics"], json!(["audit", "logs"]));
        assert!(body["uptime"].is_u64());

        let (_, body) = send(&app, get_req("/events?topic=logs")).await;
        assert_eq!(body["count"], 5);
        assert_eq!(body["events"][0]["event_id"], "0");
        assert_eq!(body["events"][0]["payload"]["message"], "hello");

        let (_, body) = send(&app, get_req("/events")).await;
        assert_eq!(body["count"], 6);

        let (_, body) = send(&app, get_req("/events?topic=missing")).await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["events"], json!([]));
    }

    #[tokio::test]
    async fn test_publish_empty_batch() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp).await;
        let app = router(state.clone());

        let (status, body) = send(&app, publish_req(&json!({ "events": [] }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["events_count"], 0);

        assert!(state.aggregator.wait_idle(Duration::from_secs(10)).await);
        let (_, body) = send(&app, get_req("/stats")).await;
        assert_eq!(body["received"], 0);
    }

    #[tokio::test]
    async fn test_publish_rejects_malformed_body() {
        let tmp = TempDir::new().unwrap();
        let app = router(test_state(&tmp).await);

        let mut missing_source = event_json("1", "t");
        missing_source.as_object_mut().unwrap().remove("source");
        let mut bad_timestamp = event_json("1", "t");
        bad_timestamp["timestamp"] = json!("yesterday");

        for body in [
            json!({ "events": [missing_source] }),
            json!({ "events": [bad_timestamp] }),
            json!({ "events": "nope" }),
            json!({}),
        ] {
            let (status, body) = send(&app, publish_req(&body)).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(body["error"], "unprocessable_entity");
        }
    }

    #[tokio::test]
    async fn test_publish_accepts_blank_fields() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp).await;
        let app = router(state.clone());

        let mut blank_source = event_json("1", "t");
        blank_source["source"] = json!("");
        let body = json!({ "events": [blank_source, event_json("", "t")] });
        let (status, body) = send(&app, publish_req(&body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["events_count"], 2);

        assert!(state.aggregator.wait_idle(Duration::from_secs(10)).await);
        let stats = state.aggregator.get_stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.unique_processed, 2);

        let (_, body) = send(&app, get_req("/events?topic=t")).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["events"][0]["source"], "");
        assert_eq!(body["events"][1]["event_id"], "");
    }

    #[tokio::test]
    async fn test_naive_timestamp_accepted() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp).await;
        let app = router(state.clone());

        let mut event = event_json("n1", "t");
        event["timestamp"] = json!("2025-03-01T10:00:00");
        let (status, _) = send(&app, publish_req(&json!({ "events": [event] }))).await;
        assert_eq!(status, StatusCode::OK);

        assert!(state.aggregator.wait_idle(Duration::from_secs(10)).await);
        let (_, body) = send(&app, get_req("/events?topic=t")).await;
        assert_eq!(body["events"][0]["timestamp"], "2025-03-01T10:00:00Z");
    }
}
