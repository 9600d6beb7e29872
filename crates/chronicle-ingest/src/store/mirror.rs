//! In-memory mirror of the durable dedup state.
//!
//! Everything here is rebuilt from SQLite at startup and only ever changed
//! after the corresponding write has committed.

use std::collections::{BTreeSet, HashMap, HashSet};

use chronicle_core::Event;

/// Set of accepted dedup keys, grouped by topic so lookups can borrow.
#[derive(Debug, Default)]
pub(crate) struct ProcessedSet {
    by_topic: HashMap<String, HashSet<String>>,
    len: usize,
}

impl ProcessedSet {
    pub(crate) fn contains(&self, event_id: &str, topic: &str) -> bool {
        self.by_topic
            .get(topic)
            .is_some_and(|ids| ids.contains(event_id))
    }

    /// Returns `true` if the key was not already present.
    pub(crate) fn insert(&mut self, event_id: &str, topic: &str) -> bool {
        let inserted = self
            .by_topic
            .entry(topic.to_string())
            .or_default()
            .insert(event_id.to_string());
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Number of distinct dedup keys.
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

/// Accepted events per topic, in acceptance order.
///
/// Topics are kept in the order their first event was accepted.
#[derive(Debug, Default)]
pub(crate) struct TopicIndex {
    order: Vec<String>,
    events: HashMap<String, Vec<Event>>,
}

impl TopicIndex {
    pub(crate) fn push(&mut self, event: Event) {
        match self.events.get_mut(&event.topic) {
            Some(events) => events.push(event),
            None => {
                self.order.push(event.topic.clone());
                self.events.insert(event.topic.clone(), vec![event]);
            }
        }
    }

    pub(crate) fn by_topic(&self, topic: &str) -> Vec<Event> {
        self.events.get(topic).cloned().unwrap_or_default()
    }

    /// Every event, topic by topic.
    pub(crate) fn all(&self) -> Vec<Event> {
        self.order
            .iter()
            .filter_map(|topic| self.events.get(topic))
            .flatten()
            .cloned()
            .collect()
    }
}

/// Aggregate counters as persisted in the `stats` row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub received: u64,
    pub duplicated_dropped: u64,
    pub topics: BTreeSet<String>,
}

/// The complete in-memory view.
#[derive(Debug, Default)]
pub(crate) struct Mirror {
    pub processed: ProcessedSet,
    pub index: TopicIndex,
    pub counters: Counters,
}

impl Mirror {
    /// Add an accepted event. A key that is already present is ignored.
    pub(crate) fn accept(&mut self, event: Event) -> bool {
        if !self.processed.insert(&event.event_id, &event.topic) {
            return false;
        }
        self.index.push(event);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chronicle_core::EventPayload;

    fn event(id: &str, topic: &str) -> Event {
        Event {
            event_id: id.to_string(),
            topic: topic.to_string(),
            source: "test".to_string(),
            payload: EventPayload {
                message: String::new(),
                timestamp: Utc::now(),
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_processed_set_scoped_by_topic() {
        let mut set = ProcessedSet::default();
        assert!(set.insert("e1", "a"));
        assert!(set.insert("e1", "b"));
        assert!(!set.insert("e1", "a"));

        assert!(set.contains("e1", "a"));
        assert!(!set.contains("e2", "a"));
        assert!(!set.contains("e1", "c"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_accept_ignores_known_key() {
        let mut mirror = Mirror::default();
        assert!(mirror.accept(event("e1", "a")));
        assert!(!mirror.accept(event("e1", "a")));

        assert_eq!(mirror.processed.len(), 1);
        assert_eq!(mirror.index.by_topic("a").len(), 1);
    }

    #[test]
    fn test_all_groups_by_first_seen_topic() {
        let mut mirror = Mirror::default();
        mirror.accept(event("1", "b"));
        mirror.accept(event("2", "a"));
        mirror.accept(event("3", "b"));

        let ids: Vec<_> = mirror
            .index
            .all()
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec!["1", "3", "2"]);
        assert!(mirror.index.by_topic("missing").is_empty());
    }
}
