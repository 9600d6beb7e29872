//! Event source adapters.
//!
//! Sources read events from somewhere other than the HTTP API and hand them
//! to a callback, which normally submits them to an
//! [`Aggregator`](crate::Aggregator).
//!
//! # Available Sources
//!
//! - [`JsonlSource`] - Reads JSONL files (one JSON event per line)

mod jsonl;

pub use jsonl::{JsonlConfig, JsonlSource};

use chronicle_core::Event;

use crate::Result;

/// A source of events.
pub trait EventSource {
    /// Human-readable name for this source (used in logs).
    fn name(&self) -> &'static str;

    /// Process events from this source, calling the handler for each valid event.
    ///
    /// The handler returns `Ok(true)` to continue processing, `Ok(false)` to
    /// stop gracefully, or `Err` to abort with an error.
    fn process<F>(&mut self, handler: F) -> Result<SourceStats>
    where
        F: FnMut(Event) -> Result<bool>;
}

/// Statistics from processing an event source.
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    /// Non-blank lines encountered.
    pub total_events: usize,

    /// Events that parsed.
    pub valid_events: usize,

    /// Events that were rejected.
    pub invalid_events: usize,

    /// Lines that were not a well-formed event, or could not be read.
    pub parse_errors: usize,

    /// Number of files read to completion.
    pub files_processed: usize,

    /// Total bytes across the input files.
    pub bytes_read: usize,
}
