//! The event record and its identity.
//!
//! An [`Event`] is produced once by a publisher and never mutated. Its
//! identity for deduplication purposes is the [`DedupKey`]: the pair of
//! `event_id` and `topic`. The same `event_id` published on two topics is two
//! distinct events.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Message body carried by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Free-text message.
    pub message: String,

    /// When the message was produced.
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Producer-assigned identifier. Not guaranteed unique across topics.
    pub event_id: String,

    /// Logical channel the event was published on.
    pub topic: String,

    /// Identity of the producer.
    pub source: String,

    /// Message body.
    pub payload: EventPayload,

    /// When the event was published.
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// The deduplication identity of this event.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.event_id, &self.topic)
    }
}

/// Deduplication identity: `(event_id, topic)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub event_id: String,
    pub topic: String,
}

impl DedupKey {
    pub fn new(event_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            topic: topic.into(),
        }
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.event_id, self.topic)
    }
}

/// Parses a single JSON event.
///
/// Only shape and types are checked. Empty strings are valid values for
/// every field; an empty `event_id` is an identity like any other.
pub fn parse_event(json: &str) -> Result<Event> {
    Ok(serde_json::from_str(json)?)
}

/// Parses an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (with offset, normalised to UTC) and offset-less
/// date-times such as `2025-01-01T00:00:00` or `2025-01-01 00:00:00.123`,
/// which are taken to be UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Serde adapter for event timestamps.
///
/// Serializes as RFC 3339 in UTC; deserializes anything [`parse_timestamp`]
/// accepts.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid ISO 8601 timestamp: {raw}")))
    }
}
