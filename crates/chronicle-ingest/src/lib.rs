//! Chronicle ingestion pipeline.
//!
//! This crate provides the deduplicating core: published events are queued,
//! drained by a single consumer, checked against a durable dedup store and
//! either accepted or counted as duplicates.
//!
//! # Modules
//!
//! - [`queue`] - Unbounded MPSC event queue with a single consumer
//! - [`store`] - SQLite-backed dedup store with an in-memory mirror
//! - [`consumer`] - The consumer loop and its start/stop lifecycle
//! - [`aggregator`] - Facade used by transports (submit, query, stats)
//! - [`source`] - Event source adapters (JSONL)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Publishers    │  (HTTP API, JSONL replay)
//! └────────┬────────┘
//!          │ submit
//!          ▼
//! ┌─────────────────┐
//! │   EventQueue    │  unbounded FIFO
//! └────────┬────────┘
//!          │ dequeue
//!          ▼
//! ┌─────────────────┐
//! │    Consumer     │  one event, one store transaction
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   DedupStore    │  SQLite (durable) + mirror (reads)
//! └─────────────────┘
//! ```
//!
//! SQLite is the source of truth. The mirror is rebuilt from it on startup
//! and only changes after a write has committed.

pub mod aggregator;
pub mod config;
pub mod consumer;
pub mod error;
pub mod queue;
pub mod source;
pub mod store;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use aggregator::{Aggregator, Stats};
pub use config::IngestConfig;
pub use consumer::{Consumer, ConsumerState, Outcome};
pub use queue::{EventQueue, EventReceiver};
pub use source::{EventSource, JsonlConfig, JsonlSource, SourceStats};
pub use store::{DedupStore, StoreStats, StoreTxn};
