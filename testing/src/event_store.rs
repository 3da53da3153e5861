//! In-memory event store
//!
//! A `HashMap`-backed [`EventStore`] that enforces the same version check a real
//! document store would, plus knobs for injecting conflicts and backend failures.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use waitlist_lottery_core::BoxFuture;
use waitlist_lottery_core::event::{EventId, EventRecord};
use waitlist_lottery_core::event_store::{EventFilter, EventStore, EventStoreError};

/// In-memory event store for fast, deterministic testing.
///
/// # Example
///
/// ```
/// use waitlist_lottery_testing::InMemoryEventStore;
/// use waitlist_lottery_core::event::{EventId, EventRecord};
/// use waitlist_lottery_core::event_store::EventStore;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryEventStore::new();
/// let version = store.put(EventRecord::new(EventId::new("e1"), 2)).await.unwrap();
/// assert_eq!(version, 1);
///
/// let loaded = store.get(EventId::new("e1")).await.unwrap();
/// assert_eq!(loaded.version, 1);
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventStore {
    records: Arc<RwLock<HashMap<EventId, EventRecord>>>,
    pending_conflicts: Arc<AtomicUsize>,
    put_failure: Arc<Mutex<Option<EventStoreError>>>,
    puts: Arc<AtomicUsize>,
}

impl InMemoryEventStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` as-is, bypassing the version check
    pub fn insert(&self, record: EventRecord) {
        self.records
            .write()
            .unwrap()
            .insert(record.event_id.clone(), record);
    }

    /// Current stored document, if any
    #[must_use]
    pub fn snapshot(&self, event_id: &EventId) -> Option<EventRecord> {
        self.records.read().unwrap().get(event_id).cloned()
    }

    /// Make the next `count` writes lose a race: each bumps the stored version
    /// (as a concurrent writer would) and fails with `VersionConflict`
    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Make every write fail with `error` until cleared with `None`
    pub fn fail_puts_with(&self, error: Option<EventStoreError>) {
        *self.put_failure.lock().unwrap() = error;
    }

    /// Number of successful writes
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of stored events
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn write(&self, mut record: EventRecord) -> Result<u64, EventStoreError> {
        if let Some(error) = self.put_failure.lock().unwrap().clone() {
            return Err(error);
        }

        let mut records = self.records.write().unwrap();
        let stored_version = records.get(&record.event_id).map(|stored| stored.version);

        match stored_version {
            None if record.version != 0 => return Err(EventStoreError::NotFound(record.event_id)),
            Some(actual) if actual != record.version => {
                return Err(EventStoreError::VersionConflict {
                    event_id: record.event_id,
                    expected: record.version,
                    actual,
                });
            }
            _ => {}
        }

        if self.take_conflict() {
            let actual = match records.get_mut(&record.event_id) {
                Some(stored) => {
                    stored.version += 1;
                    stored.version
                }
                None => 1,
            };
            return Err(EventStoreError::VersionConflict {
                event_id: record.event_id,
                expected: record.version,
                actual,
            });
        }

        record.version += 1;
        let version = record.version;
        records.insert(record.event_id.clone(), record);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(version)
    }
}

impl EventStore for InMemoryEventStore {
    fn get(&self, event_id: EventId) -> BoxFuture<'_, Result<EventRecord, EventStoreError>> {
        Box::pin(async move {
            self.snapshot(&event_id)
                .ok_or(EventStoreError::NotFound(event_id))
        })
    }

    fn put(&self, record: EventRecord) -> BoxFuture<'_, Result<u64, EventStoreError>> {
        Box::pin(async move { self.write(record) })
    }

    fn query(&self, filter: EventFilter) -> BoxFuture<'_, Result<Vec<EventRecord>, EventStoreError>> {
        Box::pin(async move {
            let records = self.records.read().unwrap();
            let mut matches: Vec<EventRecord> = records
                .values()
                .filter(|record| filter.matches(record))
                .cloned()
                .collect();
            matches.sort_by(|a, b| a.event_id.cmp(&b.event_id));
            Ok(matches)
        })
    }
}
