//! Inbound event queue.
//!
//! An unbounded FIFO between any number of producers and exactly one
//! consumer. [`EventQueue::new`] returns the cloneable producer handle and
//! the single [`EventReceiver`]; the receiver is not `Clone`, so there is no
//! way to build a second consumer for the same queue.
//!
//! The queue does not inspect events. Deduplication happens downstream in
//! the consumer loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chronicle_core::Event;
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Counters shared between the two ends of the queue.
#[derive(Debug, Default)]
struct QueueCounters {
    /// Events currently buffered.
    depth: AtomicUsize,
    /// Events ever enqueued.
    enqueued: AtomicU64,
}

/// Producer handle for the event queue.
#[derive(Debug, Clone)]
pub struct EventQueue {
    sender: mpsc::UnboundedSender<Event>,
    counters: Arc<QueueCounters>,
}

/// The single consumer handle for the event queue.
#[derive(Debug)]
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<Event>,
    counters: Arc<QueueCounters>,
}

impl EventQueue {
    /// Create a queue, returning the producer handle and the consumer.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(QueueCounters::default());
        (
            Self {
                sender,
                counters: Arc::clone(&counters),
            },
            EventReceiver { receiver, counters },
        )
    }

    /// Append an event. Never waits for the consumer.
    ///
    /// Fails only once the [`EventReceiver`] has been dropped.
    pub fn enqueue(&self, event: Event) -> Result<()> {
        // Count before sending so the consumer can never observe a dequeue
        // that was not yet counted.
        self.counters.depth.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(event).is_err() {
            self.counters.depth.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::QueueClosed);
        }
        self.counters.enqueued.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Approximate number of buffered events.
    pub fn len(&self) -> usize {
        self.counters.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of events ever accepted by [`enqueue`](Self::enqueue).
    pub fn enqueued_total(&self) -> u64 {
        self.counters.enqueued.load(Ordering::Acquire)
    }

    /// Whether the consumer side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl EventReceiver {
    /// Wait for the next event in enqueue order.
    ///
    /// Returns `None` once every producer handle has been dropped and the
    /// buffer is empty. Cancel-safe: if the future is dropped before it
    /// completes, no event is lost.
    pub async fn dequeue(&mut self) -> Option<Event> {
        let event = self.receiver.recv().await?;
        self.counters.depth.fetch_sub(1, Ordering::AcqRel);
        Some(event)
    }

    /// Approximate number of buffered events.
    pub fn len(&self) -> usize {
        self.counters.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chronicle_core::EventPayload;
    use std::time::Duration;

    fn test_event(id: &str, topic: &str) -> Event {
        Event {
            event_id: id.to_string(),
            topic: topic.to_string(),
            source: "test".to_string(),
            payload: EventPayload {
                message: format!("message {id}"),
                timestamp: Utc::now(),
            },
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (queue, mut receiver) = EventQueue::new();

        for i in 0..10 {
            queue.enqueue(test_event(&i.to_string(), "t")).unwrap();
        }
        assert_eq!(queue.len(), 10);

        for i in 0..10 {
            let event = receiver.dequeue().await.unwrap();
            assert_eq!(event.event_id, i.to_string());
        }
        assert!(queue.is_empty());
        assert_eq!(queue.enqueued_total(), 10);
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_producer() {
        let (queue, mut receiver) = EventQueue::new();

        let waiter = tokio::spawn(async move { receiver.dequeue().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.enqueue(test_event("late", "t")).unwrap();
        let event = waiter.await.unwrap().unwrap();
        assert_eq!(event.event_id, "late");
    }

    #[tokio::test]
    async fn test_multiple_producers() {
        let (queue, mut receiver) = EventQueue::new();

        let mut handles = Vec::new();
        for p in 0..4 {
            let producer = queue.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    producer
                        .enqueue(test_event(&format!("{p}-{i}"), "t"))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut per_producer: Vec<Vec<usize>> = vec![Vec::new(); 4];
        for _ in 0..100 {
            let event = receiver.dequeue().await.unwrap();
            let (p, i) = event.event_id.split_once('-').unwrap();
            per_producer[p.parse::<usize>().unwrap()].push(i.parse().unwrap());
        }

        // Each producer's events arrive in the order it sent them.
        for seq in per_producer {
            assert_eq!(seq, (0..25).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped() {
        let (queue, receiver) = EventQueue::new();
        drop(receiver);

        assert!(queue.is_closed());
        assert!(matches!(
            queue.enqueue(test_event("x", "t")),
            Err(Error::QueueClosed)
        ));
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.enqueued_total(), 0);
    }

    #[tokio::test]
    async fn test_dequeue_none_when_producers_gone() {
        let (queue, mut receiver) = EventQueue::new();
        queue.enqueue(test_event("last", "t")).unwrap();
        drop(queue);

        assert_eq!(receiver.dequeue().await.unwrap().event_id, "last");
        assert!(receiver.dequeue().await.is_none());
    }
}
