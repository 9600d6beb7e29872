//! Error types for event handling.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing events.
#[derive(Error, Debug)]
pub enum Error {
    /// JSON parsing error (missing fields, wrong types, bad timestamps).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
