//! Chronicle Serve - HTTP API for the Chronicle aggregator
//!
//! This crate exposes the ingestion core over JSON/HTTP: producers publish
//! batches of events, clients query accepted events and aggregate counters.
//! All state lives in the [`chronicle_ingest::Aggregator`] held by
//! [`AppState`]; handlers never touch storage directly.
//!
//! # Architecture
//!
//! - **AppState**: Shared application state (aggregator, configuration)
//! - **Routes**: Endpoint handlers grouped by domain
//! - **ApiError**: Mapping of body rejections and core failures to status codes

mod error;
mod routes;
mod state;

pub use self::error::ApiError;
pub use self::routes::router;
pub use self::state::{AppState, Config};
