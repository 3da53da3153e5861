//! Event store collaborator.
//!
//! The store persists whole [`EventRecord`] documents. Every write is guarded by
//! the record's `version` token: a `put` only succeeds if the stored document is
//! still at the version the writer loaded, so two read-modify-write cycles on the
//! same event can no longer silently overwrite each other.
//!
//! # Implementations
//!
//! - `InMemoryEventStore` (in `waitlist-lottery-testing`): fast, deterministic testing

use crate::BoxFuture;
use crate::event::{EventId, EventRecord, EventStatus, OrganizerId};
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// No document exists for this event.
    #[error("Event not found: {0}")]
    NotFound(EventId),

    /// Optimistic concurrency conflict: another writer updated the document first.
    #[error("Version conflict on event {event_id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// The event where the conflict occurred.
        event_id: EventId,
        /// The version the writer loaded.
        expected: u64,
        /// The version currently stored.
        actual: u64,
    },

    /// Backend failure (connection, timeout, permission).
    #[error("Event store backend error: {0}")]
    Backend(String),
}

/// Field filter for [`EventStore::query`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventFilter {
    /// Events owned by an organizer
    ByOrganizer(OrganizerId),
    /// Events in a given status
    ByStatus(EventStatus),
}

impl EventFilter {
    /// Whether `record` satisfies this filter
    #[must_use]
    pub fn matches(&self, record: &EventRecord) -> bool {
        match self {
            Self::ByOrganizer(organizer_id) => record.organizer_id.as_ref() == Some(organizer_id),
            Self::ByStatus(status) => record.status == *status,
        }
    }
}

/// Document store for event records.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be shared across tasks.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so the store can be used as
/// `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Load the current snapshot of an event.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::NotFound`] if the event does not exist, or
    /// [`EventStoreError::Backend`] on storage failure.
    fn get(&self, event_id: EventId) -> BoxFuture<'_, Result<EventRecord, EventStoreError>>;

    /// Replace the stored document with `record`.
    ///
    /// The write succeeds only if the stored version equals `record.version`
    /// (a record at version 0 that does not exist yet is inserted). Returns the
    /// new version.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::VersionConflict`] if another writer updated the
    /// document since `record` was loaded.
    fn put(&self, record: EventRecord) -> BoxFuture<'_, Result<u64, EventStoreError>>;

    /// Load every event matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Backend`] on storage failure.
    fn query(&self, filter: EventFilter) -> BoxFuture<'_, Result<Vec<EventRecord>, EventStoreError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_by_organizer() {
        let owner = OrganizerId::new("org-1");
        let event = EventRecord::new(EventId::new("e1"), 1).with_organizer(owner.clone());

        assert!(EventFilter::ByOrganizer(owner).matches(&event));
        assert!(!EventFilter::ByOrganizer(OrganizerId::new("org-2")).matches(&event));
    }

    #[test]
    fn test_filter_by_status() {
        let event = EventRecord::new(EventId::new("e1"), 1);
        assert!(EventFilter::ByStatus(EventStatus::Draft).matches(&event));
        assert!(!EventFilter::ByStatus(EventStatus::LotteryCompleted).matches(&event));
    }
}
