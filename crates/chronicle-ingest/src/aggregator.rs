//! Facade over the ingestion core.
//!
//! [`Aggregator`] owns the queue, the dedup store and the consumer, and is
//! the only type transports need. Writes go through the queue; reads are
//! served from the store's in-memory mirror and never wait on the consumer.

use std::sync::Arc;
use std::time::Duration;

use chronicle_core::Event;
use serde::Serialize;
use tracing::info;

use crate::config::IngestConfig;
use crate::consumer::{Consumer, ConsumerState};
use crate::queue::EventQueue;
use crate::store::DedupStore;
use crate::Result;

/// Aggregate statistics as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub received: u64,
    pub unique_processed: u64,
    pub duplicated_dropped: u64,
    /// Every topic seen, sorted.
    pub topics: Vec<String>,
    /// Seconds since the consumer first started.
    pub uptime_seconds: f64,
}

/// The ingestion pipeline: queue, consumer loop and dedup store.
pub struct Aggregator {
    queue: EventQueue,
    store: Arc<DedupStore>,
    consumer: Consumer,
}

impl Aggregator {
    /// Wire up the pipeline. Nothing is opened until [`initialize`](Self::initialize).
    pub fn new(config: &IngestConfig) -> Self {
        let store = Arc::new(DedupStore::new(&config.db_path));
        let (queue, receiver) = EventQueue::new();
        let consumer = Consumer::new(Arc::clone(&store), receiver);
        Self {
            queue,
            store,
            consumer,
        }
    }

    /// Open the store and load its durable state.
    pub fn initialize(&self) -> Result<()> {
        self.store.initialize()
    }

    /// Start consuming. The store must be initialized.
    pub async fn start(&self) -> Result<()> {
        if !self.store.is_initialized() {
            return Err(crate::Error::NotInitialized);
        }
        self.consumer.start().await
    }

    /// Stop consuming. Queued events are kept for a later start.
    pub async fn stop(&self) {
        self.consumer.stop().await;
    }

    /// Stop the consumer if needed and release the store.
    pub async fn close(&self) -> Result<()> {
        self.consumer.stop().await;
        if !self.queue.is_empty() {
            info!(pending = self.queue.len(), "Closing with events still queued");
        }
        self.store.close()
    }

    /// Queue one event for ingestion. The event is taken as-is; any
    /// well-typed `Event` is ingestible.
    pub fn submit(&self, event: Event) -> Result<()> {
        self.queue.enqueue(event)?;
        metrics::gauge!("ingest_queue_depth").set(self.queue.len() as f64);
        Ok(())
    }

    /// Queue events in order. Returns how many were queued.
    pub fn submit_batch(&self, events: Vec<Event>) -> Result<usize> {
        let count = events.len();
        for event in events {
            self.queue.enqueue(event)?;
        }
        metrics::gauge!("ingest_queue_depth").set(self.queue.len() as f64);
        Ok(count)
    }

    /// Every accepted event, grouped by topic in first-seen order.
    pub fn query_all(&self) -> Vec<Event> {
        self.store.all_events()
    }

    /// Accepted events for one topic, in acceptance order.
    pub fn query_by_topic(&self, topic: &str) -> Vec<Event> {
        self.store.events_by_topic(topic)
    }

    pub fn get_stats(&self) -> Stats {
        let stats = self.store.stats();
        Stats {
            received: stats.received,
            unique_processed: stats.unique_processed,
            duplicated_dropped: stats.duplicated_dropped,
            topics: stats.topics,
            uptime_seconds: self.consumer.uptime().as_secs_f64(),
        }
    }

    pub fn consumer_state(&self) -> ConsumerState {
        self.consumer.state()
    }

    /// Events waiting to be consumed.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Wait until every event submitted so far has been handled.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let drained = async {
            while self.consumer.handled() < self.queue.enqueued_total() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}
