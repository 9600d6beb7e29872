//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// The durable store cannot be opened, created or read back.
    ///
    /// Fatal at startup.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A single durable write failed. Nothing from the failed operation is
    /// reflected in memory.
    #[error("Storage write failed: {0}")]
    StorageWriteFailed(String),

    /// The store was used before `initialize()` or after `close()`.
    #[error("Store not initialized")]
    NotInitialized,

    /// The consuming side of the event queue is gone.
    #[error("Event queue closed")]
    QueueClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An input record could not be decoded as an event.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<chronicle_core::Error> for Error {
    fn from(err: chronicle_core::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_display() {
        let err = Error::StorageUnavailable("file is not a database".to_string());
        assert!(err.to_string().contains("Storage unavailable"));
        assert!(err.to_string().contains("file is not a database"));

        let err = Error::StorageWriteFailed("disk full".to_string());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_from_core_error() {
        let core = chronicle_core::parse_event(r#"{"event_id":"e1"}"#).unwrap_err();
        let err: Error = core.into();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("topic"));
    }
}
