//! Bounded, newest-first log of received webhook events.
//!
//! The log is held in memory behind a single mutex and mirrored to a
//! `KeyValueStore` under `EVENTS_KEY` after every mutation. A mutation is
//! applied to a copy of the state, persisted, and only then committed, so a
//! failed write leaves the log exactly as it was.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::store::{KeyValueStore, StoreError, EVENTS_KEY};
use super::types::{Event, EventHandle, EventStatus, LoggedEvent};

/// Default number of events retained.
pub const MAX_EVENTS: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct LogState {
    next_seq: u64,
    events: VecDeque<LoggedEvent>,
}

impl LogState {
    fn push(&mut self, mut event: Event, capacity: usize) -> EventHandle {
        event.status = EventStatus::Received;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push_front(LoggedEvent { seq, event });
        self.events.truncate(capacity);
        EventHandle(seq)
    }

    fn classify(&mut self, handle: EventHandle, event_type: &str) -> Option<EventStatus> {
        let entry = self.events.iter_mut().find(|e| e.seq == handle.0)?;
        if !entry.event.status.is_terminal() {
            entry.event.status = EventStatus::classify(event_type);
        }
        Some(entry.event.status)
    }
}

/// Shared event log.
pub struct EventLog {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    state: Mutex<LogState>,
}

impl EventLog {
    /// Open the log with the default capacity.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        Self::with_capacity(store, MAX_EVENTS)
    }

    /// Open the log, loading whatever the store already holds.
    ///
    /// Entries beyond `capacity` (e.g. after lowering it) are dropped.
    pub fn with_capacity(
        store: Arc<dyn KeyValueStore>,
        capacity: usize,
    ) -> Result<Self, StoreError> {
        let capacity = capacity.max(1);

        let mut state = match store.get(EVENTS_KEY)? {
            Some(value) => {
                serde_json::from_value::<LogState>(value).map_err(|source| {
                    StoreError::Serialization {
                        key: EVENTS_KEY.to_string(),
                        source,
                    }
                })?
            }
            None => LogState::default(),
        };

        if state.events.len() > capacity {
            warn!(
                stored = state.events.len(),
                capacity = capacity,
                "event_log_truncated_on_load"
            );
            state.events.truncate(capacity);
        }

        // Never hand out a sequence number that is already in use
        let max_seq = state.events.iter().map(|e| e.seq + 1).max().unwrap_or(0);
        state.next_seq = state.next_seq.max(max_seq);

        info!(
            events = state.events.len(),
            capacity = capacity,
            "event_log_loaded"
        );

        Ok(Self {
            store,
            capacity,
            state: Mutex::new(state),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert an event at the head with status `received`.
    ///
    /// Returns a handle for `classify` that keeps pointing at this entry
    /// regardless of what else is appended in the meantime.
    pub async fn append(&self, event: Event) -> Result<EventHandle, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let handle = next.push(event, self.capacity);
        self.persist(&next)?;
        *state = next;
        Ok(handle)
    }

    /// Move the entry named by `handle` to its terminal status.
    ///
    /// Returns `None` if the entry has since been evicted or cleared.
    pub async fn classify(
        &self,
        handle: EventHandle,
        event_type: &str,
    ) -> Result<Option<EventStatus>, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let status = match next.classify(handle, event_type) {
            Some(status) => status,
            None => return Ok(None),
        };
        self.persist(&next)?;
        *state = next;
        Ok(Some(status))
    }

    /// Append and classify an event as one atomic step.
    ///
    /// There is no await point once the lock is held, so a cancelled caller
    /// either records the whole event or nothing.
    pub async fn record(&self, event: Event) -> Result<LoggedEvent, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        let event_type = event.event_type.clone();
        let handle = next.push(event, self.capacity);
        next.classify(handle, &event_type);

        self.persist(&next)?;
        *state = next;

        // The new entry is at the head by construction
        state
            .events
            .front()
            .cloned()
            .ok_or_else(|| StoreError::Unavailable("event log empty after append".to_string()))
    }

    /// All retained events, newest first.
    pub async fn list(&self) -> Vec<LoggedEvent> {
        self.state.lock().await.events.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.events.is_empty()
    }

    /// Remove every entry.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let next = LogState {
            next_seq: state.next_seq,
            events: VecDeque::new(),
        };
        self.persist(&next)?;
        let cleared = state.events.len();
        *state = next;
        info!(cleared = cleared, "event_log_cleared");
        Ok(())
    }

    fn persist(&self, state: &LogState) -> Result<(), StoreError> {
        let value = serde_json::to_value(state).map_err(|source| StoreError::Serialization {
            key: EVENTS_KEY.to_string(),
            source,
        })?;
        self.store.put(EVENTS_KEY, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::store::{JsonFileStore, MemoryStore};
    use chrono::Utc;
    use serde_json::json;

    fn event(id: &str, event_type: &str) -> Event {
        Event {
            id: id.to_string(),
            event_type: event_type.to_string(),
            payload: json!({"id": "obj_123"}),
            received_at: Utc::now(),
            status: EventStatus::Received,
            created: None,
            livemode: None,
        }
    }

    fn memory_log() -> (Arc<MemoryStore>, EventLog) {
        let store = Arc::new(MemoryStore::new());
        let log = EventLog::new(store.clone()).unwrap();
        (store, log)
    }

    #[tokio::test]
    async fn test_append_inserts_at_head() {
        let (_, log) = memory_log();
        log.append(event("evt_1", "test.event")).await.unwrap();
        log.append(event("evt_2", "test.event")).await.unwrap();

        let events = log.list().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.id, "evt_2");
        assert_eq!(events[1].event.id, "evt_1");
        assert_eq!(events[0].event.status, EventStatus::Received);
    }

    #[tokio::test]
    async fn test_append_limits_to_capacity() {
        let (_, log) = memory_log();
        for i in 1..=60 {
            log.append(event(&format!("evt_{i}"), "test.event"))
                .await
                .unwrap();
        }

        let events = log.list().await;
        assert_eq!(events.len(), MAX_EVENTS);
        assert_eq!(events[0].event.id, "evt_60");
        assert_eq!(events[49].event.id, "evt_11");
        assert!(!events.iter().any(|e| e.event.id == "evt_10"));
    }

    #[tokio::test]
    async fn test_classify_payment_intent_succeeded() {
        let (_, log) = memory_log();
        let handle = log
            .append(event("evt_1", "payment_intent.succeeded"))
            .await
            .unwrap();
        let status = log
            .classify(handle, "payment_intent.succeeded")
            .await
            .unwrap();

        assert_eq!(status, Some(EventStatus::Processed));
        assert_eq!(log.list().await[0].event.status, EventStatus::Processed);
    }

    #[tokio::test]
    async fn test_classify_unknown_type() {
        let (_, log) = memory_log();
        let handle = log
            .append(event("evt_2", "some.unknown.event"))
            .await
            .unwrap();
        log.classify(handle, "some.unknown.event").await.unwrap();

        assert_eq!(log.list().await[0].event.status, EventStatus::Unhandled);
    }

    #[tokio::test]
    async fn test_classify_targets_handle_not_head() {
        let (_, log) = memory_log();
        let first = log
            .append(event("evt_a", "charge.succeeded"))
            .await
            .unwrap();
        log.append(event("evt_b", "other.event")).await.unwrap();

        log.classify(first, "charge.succeeded").await.unwrap();

        let events = log.list().await;
        assert_eq!(events[0].event.id, "evt_b");
        assert_eq!(events[0].event.status, EventStatus::Received);
        assert_eq!(events[1].event.id, "evt_a");
        assert_eq!(events[1].event.status, EventStatus::Processed);
    }

    #[tokio::test]
    async fn test_classify_is_terminal() {
        let (_, log) = memory_log();
        let handle = log.append(event("evt_1", "x.y")).await.unwrap();
        log.classify(handle, "x.y").await.unwrap();
        let status = log.classify(handle, "charge.succeeded").await.unwrap();

        assert_eq!(status, Some(EventStatus::Unhandled));
    }

    #[tokio::test]
    async fn test_classify_evicted_entry() {
        let store = Arc::new(MemoryStore::new());
        let log = EventLog::with_capacity(store, 2).unwrap();
        let oldest = log.append(event("evt_1", "x.y")).await.unwrap();
        log.append(event("evt_2", "x.y")).await.unwrap();
        log.append(event("evt_3", "x.y")).await.unwrap();

        assert_eq!(log.classify(oldest, "x.y").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_appends_and_classifies() {
        let (_, log) = memory_log();
        let entry = log
            .record(event("evt_1", "checkout.session.completed"))
            .await
            .unwrap();

        assert_eq!(entry.event.status, EventStatus::Processed);
        assert_eq!(log.list().await[0], entry);
    }

    #[tokio::test]
    async fn test_record_does_not_deduplicate() {
        let (_, log) = memory_log();
        let a = log.record(event("evt_dup", "x.y")).await.unwrap();
        let b = log.record(event("evt_dup", "x.y")).await.unwrap();

        assert_ne!(a.seq, b.seq);
        assert_eq!(log.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_records_keep_their_own_status() {
        let (_, log) = memory_log();
        let log = Arc::new(log);

        let mut tasks = Vec::new();
        for i in 0..20 {
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                let event_type = if i % 2 == 0 {
                    "payment_intent.succeeded"
                } else {
                    "some.unknown.event"
                };
                log.record(event(&format!("evt_{i}"), event_type)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for entry in log.list().await {
            assert_eq!(
                entry.event.status,
                EventStatus::classify(&entry.event.event_type)
            );
        }
    }

    #[tokio::test]
    async fn test_clear_empties_log() {
        let (_, log) = memory_log();
        log.record(event("evt_1", "x.y")).await.unwrap();
        log.clear().await.unwrap();

        assert!(log.list().await.is_empty());
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_log_unchanged() {
        let (store, log) = memory_log();
        log.record(event("evt_1", "x.y")).await.unwrap();

        store.set_unavailable(true);
        let result = log.record(event("evt_2", "x.y")).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(log.clear().await.is_err());

        let events = log.list().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.id, "evt_1");
    }

    #[tokio::test]
    async fn test_reload_from_store() {
        let store = Arc::new(MemoryStore::new());
        {
            let log = EventLog::new(store.clone()).unwrap();
            log.record(event("evt_1", "x.y")).await.unwrap();
            log.record(event("evt_2", "charge.succeeded")).await.unwrap();
        }

        let log = EventLog::new(store).unwrap();
        let events = log.list().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.id, "evt_2");
        assert_eq!(events[0].event.status, EventStatus::Processed);

        // Sequence numbers continue after the stored ones
        let next = log.record(event("evt_3", "x.y")).await.unwrap();
        assert!(next.seq > events[0].seq);
    }

    #[tokio::test]
    async fn test_reload_from_json_file_store() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "stripe-webhooks-log-{}-{nanos}",
            std::process::id()
        ));

        let last_seq = {
            let store = Arc::new(JsonFileStore::open(&dir).unwrap());
            let log = EventLog::new(store).unwrap();
            log.record(event("evt_1", "x.y")).await.unwrap();
            log.record(event("evt_2", "payment_intent.succeeded"))
                .await
                .unwrap()
                .seq
        };

        // On-disk shape: {"next_seq": n, "events": [...newest first]}
        let raw = std::fs::read_to_string(dir.join(format!("{EVENTS_KEY}.json"))).unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["next_seq"], last_seq + 1);
        assert_eq!(stored["events"][0]["id"], "evt_2");
        assert_eq!(stored["events"][0]["seq"], last_seq);
        assert_eq!(stored["events"][0]["status"], "processed");
        assert_eq!(stored["events"][1]["status"], "unhandled");

        let store = Arc::new(JsonFileStore::open(&dir).unwrap());
        let log = EventLog::new(store).unwrap();
        let events = log.list().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.id, "evt_2");
        assert_eq!(events[0].event.status, EventStatus::Processed);

        let next = log.record(event("evt_3", "x.y")).await.unwrap();
        assert_eq!(next.seq, last_seq + 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_reload_with_smaller_capacity() {
        let store = Arc::new(MemoryStore::new());
        {
            let log = EventLog::new(store.clone()).unwrap();
            for i in 0..10 {
                log.record(event(&format!("evt_{i}"), "x.y")).await.unwrap();
            }
        }

        let log = EventLog::with_capacity(store, 3).unwrap();
        let events = log.list().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event.id, "evt_9");
    }
}
