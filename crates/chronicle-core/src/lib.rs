//! Core types, parsing, and shared utilities for the Chronicle aggregator.
//!
//! This crate provides:
//! - The [`Event`] record published by producers, and its [`DedupKey`]
//! - Strict JSON parsing of events
//! - Lenient ISO-8601 timestamp handling (offset-less timestamps are UTC)
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
mod event;
pub mod metrics;

pub use error::{Error, Result};
pub use event::{DedupKey, Event, EventPayload, parse_event, parse_timestamp, timestamp};
