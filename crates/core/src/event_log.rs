//! Run-scoped, append-only event log.

use crate::event::Event;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

const SUBSCRIBER_CAPACITY: usize = 1024;

/// Ordered record of every event emitted during one run.
///
/// Cloning is cheap and every clone appends to the same log. Appends are
/// serialized by a single lock, so the stored order is the order in which
/// `append` calls took effect. Subscribers see events in that same order.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<Inner>,
}

struct Inner {
    events: Mutex<Vec<Event>>,
    sender: broadcast::Sender<Event>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                events: Mutex::new(Vec::new()),
                sender,
            }),
        }
    }

    /// Append an event.
    pub fn append(&self, event: Event) {
        let mut events = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Sent under the lock so subscribers observe the stored order.
        let _ = self.inner.sender.send(event.clone());
        events.push(event);
    }

    /// Every event so far, in append order.
    pub fn events(&self) -> Vec<Event> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive events appended from now on.
    ///
    /// A receiver that falls more than 1024 events behind gets
    /// `RecvError::Lagged` and can fall back to [`EventLog::events`].
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.sender.subscribe()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_and_read_in_order() {
        let log = EventLog::new();
        assert!(log.is_empty());

        log.append(Event::other("a", json!(1)));
        log.append(Event::other("b", json!(2)));

        let names: Vec<_> = log.events().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_clones_share_log() {
        let log = EventLog::new();
        let other = log.clone();
        other.append(Event::other("x", json!(null)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_separate_logs_are_isolated() {
        let a = EventLog::new();
        let b = EventLog::new();
        a.append(Event::other("x", json!(null)));
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_recorded() {
        let log = EventLog::new();
        let mut handles = Vec::new();

        for i in 0..8 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..50 {
                    log.append(Event::other(format!("{i}-{j}"), json!(null)));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let events = log.events();
        assert_eq!(events.len(), 400);

        // Per-writer order is preserved.
        for i in 0..8 {
            let prefix = format!("{i}-");
            let seq: Vec<usize> = events
                .iter()
                .filter_map(|e| e.name.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..50).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_subscribers_see_appends() {
        let log = EventLog::new();
        let mut rx = log.subscribe();

        log.append(Event::other("first", json!(null)));
        log.append(Event::other("second", json!(null)));

        assert_eq!(rx.recv().await.unwrap().name, "first");
        assert_eq!(rx.recv().await.unwrap().name, "second");
    }
}
