//! Durable deduplication store backed by SQLite.
//!
//! This module provides the [`DedupStore`], the source of truth for "has this
//! event been accepted before". It keeps two tiers:
//!
//! - **SQLite**: the `processed_events` table (keyed by `(event_id, topic)`)
//!   and the single-row `stats` table. Survives restarts.
//! - **Mirror**: the processed set, per-topic index and counters, rebuilt
//!   from SQLite at [`initialize`](DedupStore::initialize). Serves every
//!   membership test and every query without I/O.
//!
//! # Durability ordering
//!
//! Mutations are staged in a [`StoreTxn`], committed to SQLite in one
//! transaction, and only then applied to the mirror. A failed commit leaves
//! both tiers exactly as they were.
//!
//! # Concurrency
//!
//! The connection sits behind a mutex that a [`StoreTxn`] holds for its whole
//! life, so writers are serialized. Readers take a shared lock on the mirror
//! and copy out a snapshot; they never wait on SQLite.

mod mirror;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use chronicle_core::{Event, EventPayload, parse_timestamp};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, info, warn};

use self::mirror::{Counters, Mirror};
use crate::{Error, Result};

/// Point-in-time copy of the aggregate counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Events dequeued and inspected.
    pub received: u64,
    /// Distinct dedup keys accepted. Always the size of the processed set.
    pub unique_processed: u64,
    /// Events rejected as duplicates.
    pub duplicated_dropped: u64,
    /// Every topic seen, duplicates included, sorted.
    pub topics: Vec<String>,
}

/// SQLite-backed dedup store with an in-memory mirror.
pub struct DedupStore {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
    mirror: RwLock<Mirror>,
}

impl std::fmt::Debug for DedupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupStore")
            .field("path", &self.path)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl DedupStore {
    /// Create a store for the database at `path`. No I/O happens until
    /// [`initialize`](Self::initialize).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            conn: Mutex::new(None),
            mirror: RwLock::new(Mirror::default()),
        }
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Open or create the database and rebuild the mirror from it.
    ///
    /// Calling this on an already initialized store is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::StorageUnavailable`] if the file cannot be opened, is not a
    /// SQLite database, or holds rows that cannot be decoded.
    pub fn initialize(&self) -> Result<()> {
        let mut slot = self.conn.lock();
        if slot.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StorageUnavailable(format!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        info!("Opening dedup store at {}", self.path.display());

        let conn = Connection::open(&self.path)
            .map_err(|e| Error::StorageUnavailable(format!("Failed to open SQLite: {}", e)))?;

        // WAL for concurrent readers; FULL so a commit survives power loss.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .map_err(|e| Error::StorageUnavailable(format!("Failed to set PRAGMA: {}", e)))?;

        schema::init_schema(&conn)?;

        let mirror = load_mirror(&conn)?;
        info!(
            unique = mirror.processed.len(),
            received = mirror.counters.received,
            duplicated_dropped = mirror.counters.duplicated_dropped,
            topics = mirror.counters.topics.len(),
            "Dedup store loaded"
        );
        metrics::gauge!("dedupe_keys").set(mirror.processed.len() as f64);

        *self.mirror.write() = mirror;
        *slot = Some(conn);
        Ok(())
    }

    /// Release the database handle. Safe to call more than once.
    ///
    /// The mirror is kept, so reads keep answering with the last committed
    /// state; further writes fail with [`Error::NotInitialized`].
    pub fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };

        conn.close().map_err(|(_, e)| {
            Error::StorageWriteFailed(format!("Failed to close SQLite: {}", e))
        })?;

        info!("Dedup store closed");
        Ok(())
    }

    /// Start a write transaction.
    ///
    /// Blocks while another transaction is open.
    pub fn transaction(&self) -> Result<StoreTxn<'_>> {
        let conn = self.conn.lock();
        if conn.is_none() {
            return Err(Error::NotInitialized);
        }
        Ok(StoreTxn {
            store: self,
            conn,
            received: 0,
            duplicated: 0,
            new_topics: Vec::new(),
            accepted: Vec::new(),
        })
    }

    /// Whether the dedup key has been accepted. Memory only.
    pub fn is_processed(&self, event_id: &str, topic: &str) -> bool {
        self.mirror.read().processed.contains(event_id, topic)
    }

    /// Accept an event if its dedup key is new.
    ///
    /// Returns `true` if the event was accepted, `false` if the key was
    /// already present (nothing is written in that case).
    pub fn mark_processed(&self, event: Event) -> Result<bool> {
        let mut txn = self.transaction()?;
        let accepted = txn.mark_processed(event);
        txn.commit()?;
        Ok(accepted)
    }

    /// Count one inspected event.
    pub fn record_received(&self) -> Result<()> {
        let mut txn = self.transaction()?;
        txn.record_received();
        txn.commit()
    }

    /// Count one dropped duplicate.
    pub fn record_duplicate(&self) -> Result<()> {
        let mut txn = self.transaction()?;
        txn.record_duplicate();
        txn.commit()
    }

    /// Add a topic to the set of topics seen.
    pub fn record_topic(&self, topic: &str) -> Result<()> {
        let mut txn = self.transaction()?;
        txn.record_topic(topic);
        txn.commit()
    }

    /// Every accepted event, topic by topic in first-seen order.
    pub fn all_events(&self) -> Vec<Event> {
        self.mirror.read().index.all()
    }

    /// Accepted events for one topic in acceptance order. Unknown topics
    /// yield an empty list.
    pub fn events_by_topic(&self, topic: &str) -> Vec<Event> {
        self.mirror.read().index.by_topic(topic)
    }

    /// Number of distinct dedup keys accepted.
    pub fn unique_processed(&self) -> u64 {
        self.mirror.read().processed.len() as u64
    }

    /// Consistent snapshot of the aggregate counters.
    pub fn stats(&self) -> StoreStats {
        let mirror = self.mirror.read();
        StoreStats {
            received: mirror.counters.received,
            unique_processed: mirror.processed.len() as u64,
            duplicated_dropped: mirror.counters.duplicated_dropped,
            topics: mirror.counters.topics.iter().cloned().collect(),
        }
    }
}

/// A batch of store mutations applied atomically.
///
/// Operations are staged in memory; nothing is visible to readers until
/// [`commit`](Self::commit) has written them to SQLite. Dropping the
/// transaction without committing discards them.
pub struct StoreTxn<'a> {
    store: &'a DedupStore,
    conn: MutexGuard<'a, Option<Connection>>,
    received: u64,
    duplicated: u64,
    new_topics: Vec<String>,
    accepted: Vec<Event>,
}

impl StoreTxn<'_> {
    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.duplicated += 1;
    }

    pub fn record_topic(&mut self, topic: &str) {
        if self.store.mirror.read().counters.topics.contains(topic)
            || self.new_topics.iter().any(|t| t == topic)
        {
            return;
        }
        self.new_topics.push(topic.to_string());
    }

    /// Membership test that also sees events staged in this transaction.
    pub fn is_processed(&self, event_id: &str, topic: &str) -> bool {
        self.store.is_processed(event_id, topic)
            || self
                .accepted
                .iter()
                .any(|e| e.event_id == event_id && e.topic == topic)
    }

    /// Stage an event for acceptance. Returns `false` without staging if the
    /// key is already accepted or staged.
    pub fn mark_processed(&mut self, event: Event) -> bool {
        if self.is_processed(&event.event_id, &event.topic) {
            return false;
        }
        self.accepted.push(event);
        true
    }

    /// Whether anything has been staged.
    pub fn is_empty(&self) -> bool {
        self.received == 0
            && self.duplicated == 0
            && self.new_topics.is_empty()
            && self.accepted.is_empty()
    }

    /// Persist the staged operations, then apply them to the mirror.
    ///
    /// # Errors
    ///
    /// [`Error::StorageWriteFailed`] if SQLite rejects any statement or the
    /// commit. The mirror is left untouched.
    pub fn commit(self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let StoreTxn {
            store,
            mut conn,
            received,
            duplicated,
            new_topics,
            accepted,
        } = self;

        let conn = (*conn).as_mut().ok_or(Error::NotInitialized)?;

        let counters = {
            let mirror = store.mirror.read();
            let mut next = mirror.counters.clone();
            next.received += received;
            next.duplicated_dropped += duplicated;
            next.topics.extend(new_topics);
            next
        };

        let tx = conn.transaction().map_err(write_failed)?;

        for event in &accepted {
            let payload = serde_json::to_string(&event.payload)
                .map_err(|e| Error::Serialization(e.to_string()))?;
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO processed_events
                     (event_id, topic, source, payload, timestamp)
                     VALUES (?, ?, ?, ?, ?)",
                    params![
                        event.event_id,
                        event.topic,
                        event.source,
                        payload,
                        event.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    ],
                )
                .map_err(write_failed)?;
            if changed == 0 {
                warn!(
                    event_id = %event.event_id,
                    topic = %event.topic,
                    "Event already stored but missing from memory"
                );
            }
        }

        write_counters(&tx, &counters)?;

        tx.commit().map_err(write_failed)?;

        let mut mirror = store.mirror.write();
        mirror.counters = counters;
        for event in accepted {
            mirror.accept(event);
        }
        metrics::gauge!("dedupe_keys").set(mirror.processed.len() as f64);
        debug!(
            received = mirror.counters.received,
            unique = mirror.processed.len(),
            "Store transaction committed"
        );

        Ok(())
    }
}

fn write_counters(conn: &Connection, counters: &Counters) -> Result<()> {
    let topics = serde_json::to_string(&counters.topics)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT OR REPLACE INTO stats (id, received, duplicated_dropped, topics)
         VALUES (1, ?, ?, ?)",
        params![
            to_sql_count(counters.received),
            to_sql_count(counters.duplicated_dropped),
            topics
        ],
    )
    .map_err(write_failed)?;
    Ok(())
}

fn write_failed(err: rusqlite::Error) -> Error {
    Error::StorageWriteFailed(err.to_string())
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// A `processed_events` row as stored.
struct StoredEvent {
    event_id: String,
    topic: String,
    source: String,
    payload: String,
    timestamp: String,
}

impl StoredEvent {
    fn into_event(self) -> Result<Event> {
        let payload: EventPayload = serde_json::from_str(&self.payload).map_err(|e| {
            Error::StorageUnavailable(format!(
                "Corrupt payload for {}@{}: {}",
                self.event_id, self.topic, e
            ))
        })?;
        let timestamp = parse_timestamp(&self.timestamp).ok_or_else(|| {
            Error::StorageUnavailable(format!(
                "Corrupt timestamp for {}@{}: {}",
                self.event_id, self.topic, self.timestamp
            ))
        })?;

        Ok(Event {
            event_id: self.event_id,
            topic: self.topic,
            source: self.source,
            payload,
            timestamp,
        })
    }
}

/// Rebuild the mirror from every durable row.
fn load_mirror(conn: &Connection) -> Result<Mirror> {
    let corrupt = |e: rusqlite::Error| Error::StorageUnavailable(format!("Failed to load: {}", e));

    let mut mirror = Mirror::default();

    // rowid order is insertion order.
    let mut stmt = conn
        .prepare(
            "SELECT event_id, topic, source, payload, timestamp
             FROM processed_events ORDER BY rowid",
        )
        .map_err(corrupt)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredEvent {
                event_id: row.get(0)?,
                topic: row.get(1)?,
                source: row.get(2)?,
                payload: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })
        .map_err(corrupt)?;

    for row in rows {
        mirror.accept(row.map_err(corrupt)?.into_event()?);
    }

    let stats: Option<(i64, i64, String)> = conn
        .query_row(
            "SELECT received, duplicated_dropped, topics FROM stats WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(corrupt)?;

    if let Some((received, duplicated_dropped, topics)) = stats {
        mirror.counters = Counters {
            received: from_sql_count("received", received)?,
            duplicated_dropped: from_sql_count("duplicated_dropped", duplicated_dropped)?,
            topics: serde_json::from_str(&topics).map_err(|e| {
                Error::StorageUnavailable(format!("Corrupt topic set: {}", e))
            })?,
        };
    }

    let unique = mirror.processed.len() as u64;
    if mirror.counters.received != unique + mirror.counters.duplicated_dropped {
        warn!(
            received = mirror.counters.received,
            unique,
            duplicated_dropped = mirror.counters.duplicated_dropped,
            "Stored counters do not add up; a previous run stopped between writes"
        );
    }

    Ok(mirror)
}

fn from_sql_count(column: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::StorageUnavailable(format!("Negative {} count: {}", column, value)))
}
