//! The single consumer loop that drains the event queue into the dedup store.
//!
//! For every dequeued event the loop, inside one store transaction:
//!
//! 1. counts it as received and records its topic,
//! 2. drops it as a duplicate if its `(event_id, topic)` key is known,
//! 3. otherwise accepts it.
//!
//! The transaction runs on the blocking pool so SQLite fsyncs never stall
//! the runtime. A failure on one event is logged and the loop moves on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chronicle_core::Event;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::EventReceiver;
use crate::store::DedupStore;
use crate::{Error, Result};

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// First time this key was seen; the event is now stored.
    Accepted,
    /// Key already stored; the event was counted and dropped.
    Duplicate,
}

/// Lifecycle state of the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerState {
    Running,
    Stopped,
}

enum LoopState {
    /// Not running; holds the receiver until the next start.
    Stopped(EventReceiver),
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<EventReceiver>,
    },
    /// The loop task died and took the receiver with it.
    Lost,
}

/// Owns the consuming end of the queue and the task that drains it.
pub struct Consumer {
    store: Arc<DedupStore>,
    state: Mutex<LoopState>,
    running: Arc<AtomicBool>,
    started_at: OnceLock<Instant>,
    handled: Arc<AtomicU64>,
}

impl Consumer {
    pub fn new(store: Arc<DedupStore>, receiver: EventReceiver) -> Self {
        Self {
            store,
            state: Mutex::new(LoopState::Stopped(receiver)),
            running: Arc::new(AtomicBool::new(false)),
            started_at: OnceLock::new(),
            handled: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the loop task. Does nothing if it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let receiver = match std::mem::replace(&mut *state, LoopState::Lost) {
            LoopState::Stopped(receiver) => receiver,
            running @ LoopState::Running { .. } => {
                *state = running;
                debug!("Consumer already running");
                return Ok(());
            }
            LoopState::Lost => return Err(Error::QueueClosed),
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(consume_loop(
            Arc::clone(&self.store),
            receiver,
            cancel.clone(),
            Arc::clone(&self.running),
            Arc::clone(&self.handled),
        ));

        self.running.store(true, Ordering::Release);
        self.started_at.get_or_init(Instant::now);
        metrics::gauge!("ingest_running").set(1.0);
        *state = LoopState::Running { cancel, handle };

        info!("Consumer started");
        Ok(())
    }

    /// Cancel the loop and wait for it to exit.
    ///
    /// An event already taken off the queue is finished first. Events still
    /// queued stay queued for the next [`start`](Self::start).
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;

        let (cancel, handle) = match std::mem::replace(&mut *state, LoopState::Lost) {
            LoopState::Running { cancel, handle } => (cancel, handle),
            other => {
                *state = other;
                return;
            }
        };

        cancel.cancel();
        match handle.await {
            Ok(receiver) => {
                *state = LoopState::Stopped(receiver);
                info!("Consumer stopped");
            }
            Err(e) => {
                error!("Consumer task failed: {}", e);
            }
        }

        self.running.store(false, Ordering::Release);
        metrics::gauge!("ingest_running").set(0.0);
    }

    pub fn state(&self) -> ConsumerState {
        if self.running.load(Ordering::Acquire) {
            ConsumerState::Running
        } else {
            ConsumerState::Stopped
        }
    }

    /// Time since the first successful start; zero if never started.
    pub fn uptime(&self) -> Duration {
        self.started_at
            .get()
            .map(Instant::elapsed)
            .unwrap_or_default()
    }

    /// Events taken off the queue and fully handled, failures included.
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Acquire)
    }
}

async fn consume_loop(
    store: Arc<DedupStore>,
    mut receiver: EventReceiver,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    handled: Arc<AtomicU64>,
) -> EventReceiver {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = receiver.dequeue() => match event {
                Some(event) => event,
                None => {
                    warn!("All producers dropped, consumer exiting");
                    running.store(false, Ordering::Release);
                    metrics::gauge!("ingest_running").set(0.0);
                    break;
                }
            },
        };

        metrics::gauge!("ingest_queue_depth").set(receiver.len() as f64);
        metrics::counter!("ingest_events_total").increment(1);

        let key = event.dedup_key();
        let worker_store = Arc::clone(&store);
        match tokio::task::spawn_blocking(move || process_event(&worker_store, event)).await {
            Ok(Ok(Outcome::Accepted)) => {
                metrics::counter!("ingest_events_unique_total").increment(1);
                debug!(%key, "Processed unique event");
            }
            Ok(Ok(Outcome::Duplicate)) => {
                metrics::counter!("ingest_events_duplicate_total").increment(1);
                debug!(%key, "Dropped duplicate event");
            }
            Ok(Err(e)) => {
                metrics::counter!("ingest_events_failed_total").increment(1);
                error!(%key, "Failed to process event: {}", e);
            }
            Err(e) => {
                metrics::counter!("ingest_events_failed_total").increment(1);
                error!(%key, "Event processing panicked: {}", e);
            }
        }

        handled.fetch_add(1, Ordering::AcqRel);
    }

    receiver
}

/// Run one event through the dedup decision as a single store transaction.
///
/// Blocking: performs SQLite I/O.
pub fn process_event(store: &DedupStore, event: Event) -> Result<Outcome> {
    let mut txn = store.transaction()?;
    txn.record_received();
    txn.record_topic(&event.topic);

    let outcome = if txn.is_processed(&event.event_id, &event.topic) {
        txn.record_duplicate();
        Outcome::Duplicate
    } else {
        txn.mark_processed(event);
        Outcome::Accepted
    };

    txn.commit()?;
    Ok(outcome)
}
