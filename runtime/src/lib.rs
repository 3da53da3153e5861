//! # Waitlist Lottery Runtime
//!
//! The imperative shell around the lottery reducer.
//!
//! The [`Coordinator`] runs every action as a short read-modify-write cycle:
//!
//! 1. Take the event's lock (one writer per event, different events in parallel)
//! 2. Load the record from the [`EventStore`]
//! 3. Reduce the action into a persistence intent and notification intents
//! 4. Write the snapshot, guarded by its `version`
//! 5. On a version conflict, reload and re-reduce (bounded); on any other store
//!    error, fail without notifying anyone
//! 6. Dispatch notifications in the background and hand back a [`DispatchHandle`]
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use waitlist_lottery_core::event::{EventId, EventRecord};
//! use waitlist_lottery_core::lottery::LotteryAction;
//! use waitlist_lottery_runtime::Coordinator;
//! use waitlist_lottery_testing::{InMemoryEventStore, RecordingDispatcher, test_environment};
//!
//! # tokio_test::block_on(async {
//! let dispatcher = RecordingDispatcher::new();
//! let coordinator = Coordinator::new(
//!     Arc::new(InMemoryEventStore::new()),
//!     Arc::new(dispatcher.clone()),
//!     test_environment(1),
//! );
//!
//! let event = coordinator.create_event(EventRecord::new(EventId::new("e1"), 1)).await.unwrap();
//! for id in ["a", "b"] {
//!     let join = LotteryAction::JoinWaitlist { entrant_id: id.into(), location: None };
//!     coordinator.send(event.event_id.clone(), join).await.unwrap();
//! }
//!
//! let mut outcome = coordinator.send(event.event_id.clone(), LotteryAction::RunLottery).await.unwrap();
//! outcome.dispatch.wait().await;
//!
//! assert_eq!(outcome.event.selected_attendees.len(), 1);
//! assert_eq!(dispatcher.len(), 2);
//! # });
//! ```

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, watch};
use waitlist_lottery_core::SmallVec;
use waitlist_lottery_core::effect::Effect;
use waitlist_lottery_core::event::{EventId, EventRecord};
use waitlist_lottery_core::event_store::{EventFilter, EventStore, EventStoreError};
use waitlist_lottery_core::lottery::{
    LotteryAction, LotteryEnvironment, LotteryReducer, LotteryState, SkipReason,
};
use waitlist_lottery_core::notification::{
    NotificationDispatcher, NotificationError, NotificationRequest, OutcomeKind,
};
use waitlist_lottery_core::reducer::Reducer;

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

use metrics::{ActionResult, LotteryMetrics};
use retry::{RetryPolicy, retry_with_predicate};

/// Error types for the coordinator
pub mod error {
    use thiserror::Error;
    use waitlist_lottery_core::event::EventId;
    use waitlist_lottery_core::event_store::EventStoreError;

    /// Errors returned by [`Coordinator`](crate::Coordinator) operations.
    ///
    /// A precondition skip is not an error; it comes back as
    /// [`ActionOutcome::skipped`](crate::ActionOutcome::skipped).
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum CoordinatorError {
        /// The event does not exist in the store
        #[error("Event not found: {0}")]
        EventNotFound(EventId),

        /// The store failed to load or write the event.
        ///
        /// Nothing was persisted and no notifications were sent.
        #[error("Failed to persist event {event_id}: {source}")]
        Persistence {
            /// Event being written
            event_id: EventId,
            /// Underlying store error
            source: EventStoreError,
        },

        /// The store failed to answer a filtered read
        #[error("Event query failed: {0}")]
        Query(#[source] EventStoreError),

        /// Every attempt lost the race against another writer
        #[error("Gave up on event {event_id} after {attempts} conflicting writes")]
        ConflictRetriesExhausted {
            /// Event being written
            event_id: EventId,
            /// Attempts made
            attempts: usize,
        },
    }
}

pub use error::CoordinatorError;

/// Configuration for the [`Coordinator`]
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use waitlist_lottery_runtime::CoordinatorConfig;
/// use waitlist_lottery_runtime::retry::RetryPolicy;
///
/// let config = CoordinatorConfig::default()
///     .with_persist_max_attempts(5)
///     .with_notification_retry(
///         RetryPolicy::builder()
///             .max_retries(2)
///             .initial_delay(Duration::from_millis(200))
///             .build(),
///     );
/// assert_eq!(config.persist_max_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Load-reduce-write attempts per action before giving up on conflicts
    pub persist_max_attempts: usize,
    /// Retry policy for transient notification failures
    pub notification_retry: RetryPolicy,
}

impl CoordinatorConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(persist_max_attempts: usize, notification_retry: RetryPolicy) -> Self {
        Self {
            persist_max_attempts,
            notification_retry,
        }
    }

    /// Set the maximum number of write attempts
    #[must_use]
    pub const fn with_persist_max_attempts(mut self, attempts: usize) -> Self {
        self.persist_max_attempts = attempts;
        self
    }

    /// Set the notification retry policy
    #[must_use]
    pub const fn with_notification_retry(mut self, policy: RetryPolicy) -> Self {
        self.notification_retry = policy;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            persist_max_attempts: 3,
            notification_retry: RetryPolicy::no_retry(),
        }
    }
}

/// Handle for tracking notification delivery
///
/// Returned inside every [`ActionOutcome`]. Delivery runs in the background;
/// await [`DispatchHandle::wait`] to know when every notification for the
/// action has been attempted.
#[derive(Clone)]
pub struct DispatchHandle {
    pending: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl DispatchHandle {
    fn new() -> (Self, DispatchTracking) {
        let pending = Arc::new(AtomicUsize::new(1));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            pending: Arc::clone(&pending),
            completion: rx,
        };
        let tracking = DispatchTracking {
            pending,
            notifier: tx,
        };
        (handle, tracking)
    }

    /// Create a handle with nothing to wait for
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Whether delivery is still running
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// Wait until every notification has been attempted
    pub async fn wait(&mut self) {
        while self.is_pending() {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for delivery with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before delivery finishes.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: completion side of a [`DispatchHandle`]
struct DispatchTracking {
    pending: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

/// Internal: marks delivery finished on drop, even if the task panics
struct CompletionGuard(DispatchTracking);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.0.notifier.send(());
        }
    }
}

/// Result of [`Coordinator::send`]
#[derive(Debug)]
pub struct ActionOutcome {
    /// The record after the action (as persisted, with its new version)
    pub event: EventRecord,
    /// Why the action was a no-op; `None` if it was persisted
    pub skipped: Option<SkipReason>,
    /// Notifications handed to the dispatcher
    pub notifications: Vec<NotificationRequest>,
    /// Delivery progress for `notifications`
    pub dispatch: DispatchHandle,
}

impl ActionOutcome {
    /// Whether the action changed and persisted the event
    #[must_use]
    pub const fn applied(&self) -> bool {
        self.skipped.is_none()
    }

    fn unchanged(event: EventRecord, reason: Option<SkipReason>) -> Self {
        Self {
            event,
            skipped: reason,
            notifications: Vec::new(),
            dispatch: DispatchHandle::completed(),
        }
    }
}

/// Coordinates lottery actions against a store and a dispatcher
///
/// Cloning is cheap; clones share the store, dispatcher and per-event locks.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn EventStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    reducer: LotteryReducer,
    environment: LotteryEnvironment,
    config: CoordinatorConfig,
    locks: Arc<StdMutex<HashMap<EventId, Arc<Mutex<()>>>>>,
}

impl Coordinator {
    /// Create a coordinator with the default configuration
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        environment: LotteryEnvironment,
    ) -> Self {
        Self::with_config(store, dispatcher, environment, CoordinatorConfig::default())
    }

    /// Create a coordinator with a custom configuration
    #[must_use]
    pub fn with_config(
        store: Arc<dyn EventStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        environment: LotteryEnvironment,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            reducer: LotteryReducer::new(),
            environment,
            config,
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// The active configuration
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Store a new event.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Persistence`] if the store rejects the write,
    /// including when an event with the same id already exists.
    #[tracing::instrument(skip(self, record), fields(event_id = %record.event_id))]
    pub async fn create_event(&self, mut record: EventRecord) -> Result<EventRecord, CoordinatorError> {
        record.version = 0;
        match self.store.put(record.clone()).await {
            Ok(version) => {
                record.version = version;
                tracing::info!(max_attendees = record.max_attendees, "Event created");
                Ok(record)
            }
            Err(source) => {
                tracing::error!(error = %source, "Failed to create event");
                Err(CoordinatorError::Persistence {
                    event_id: record.event_id,
                    source,
                })
            }
        }
    }

    /// Load an event without running any checks
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::EventNotFound`] or [`CoordinatorError::Persistence`].
    pub async fn event(&self, event_id: &EventId) -> Result<EventRecord, CoordinatorError> {
        self.store.get(event_id.clone()).await.map_err(|source| match source {
            EventStoreError::NotFound(id) => CoordinatorError::EventNotFound(id),
            source => CoordinatorError::Persistence {
                event_id: event_id.clone(),
                source,
            },
        })
    }

    /// Load every event matching `filter`
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Query`] on store failure.
    pub async fn events(&self, filter: EventFilter) -> Result<Vec<EventRecord>, CoordinatorError> {
        self.store
            .query(filter)
            .await
            .map_err(CoordinatorError::Query)
    }

    /// Load an event for display, auto-running the lottery first if the
    /// registration deadline has passed and it never ran.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::send`].
    pub async fn load_for_display(&self, event_id: EventId) -> Result<EventRecord, CoordinatorError> {
        Ok(self.send(event_id, LotteryAction::MaybeAutoRun).await?.event)
    }

    /// Apply one action to one event.
    ///
    /// Actions on the same event are serialized; the returned outcome reflects
    /// exactly the record that was persisted. Notifications are dispatched only
    /// after the write succeeds.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::EventNotFound`]: no such event
    /// - [`CoordinatorError::Persistence`]: store failure; nothing was notified
    /// - [`CoordinatorError::ConflictRetriesExhausted`]: every write attempt conflicted
    #[tracing::instrument(skip(self, action), fields(action = action.name()))]
    pub async fn send(
        &self,
        event_id: EventId,
        action: LotteryAction,
    ) -> Result<ActionOutcome, CoordinatorError> {
        let action_name = action.name();
        let started = Instant::now();

        let lock = self.event_lock(&event_id);
        let result = {
            let _guard = lock.lock().await;
            self.apply(&event_id, &action).await
        };
        if matches!(result, Err(CoordinatorError::EventNotFound(_))) {
            self.forget_lock(&event_id, &lock);
        }

        let label = match &result {
            Ok(outcome) if outcome.applied() => ActionResult::Applied,
            Ok(_) => ActionResult::Skipped,
            Err(_) => ActionResult::Failed,
        };
        LotteryMetrics::record_action(action_name, label, started.elapsed());
        result
    }

    fn event_lock(&self, event_id: &EventId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(event_id.clone()).or_default())
    }

    /// Drops the entry for an id with no record unless another caller shares it
    fn forget_lock(&self, event_id: &EventId, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let unshared = locks
            .get(event_id)
            .is_some_and(|held| Arc::ptr_eq(held, lock) && Arc::strong_count(lock) == 2);
        if unshared {
            locks.remove(event_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn apply(
        &self,
        event_id: &EventId,
        action: &LotteryAction,
    ) -> Result<ActionOutcome, CoordinatorError> {
        let max_attempts = self.config.persist_max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let record = self.event(event_id).await?;
            let mut state = LotteryState::new(record);
            let effects = self
                .reducer
                .reduce(&mut state, action.clone(), &self.environment);

            let (snapshot, notifications) = split_effects(effects);
            let Some(snapshot) = snapshot else {
                return Ok(ActionOutcome::unchanged(state.event, state.last_skip));
            };

            match self.store.put(*snapshot).await {
                Ok(version) => {
                    let mut event = state.event;
                    event.version = version;
                    tracing::info!(
                        version,
                        notifications = notifications.len(),
                        "Event persisted"
                    );

                    if let Some(kind) = selection_kind(action) {
                        let drawn = notifications
                            .iter()
                            .filter(|n| n.outcome == OutcomeKind::SelectedFromWaitlist)
                            .count();
                        LotteryMetrics::record_selected(kind, drawn);
                    }

                    let dispatch = self.dispatch(notifications.clone());
                    return Ok(ActionOutcome {
                        event,
                        skipped: None,
                        notifications,
                        dispatch,
                    });
                }
                Err(EventStoreError::VersionConflict {
                    expected, actual, ..
                }) => {
                    LotteryMetrics::record_conflict();
                    tracing::warn!(attempt, expected, actual, "Version conflict, reloading event");
                }
                Err(source) => {
                    tracing::error!(error = %source, "Failed to persist event");
                    return Err(CoordinatorError::Persistence {
                        event_id: event_id.clone(),
                        source,
                    });
                }
            }
        }

        tracing::error!(attempts = max_attempts, "Giving up after repeated version conflicts");
        Err(CoordinatorError::ConflictRetriesExhausted {
            event_id: event_id.clone(),
            attempts: max_attempts,
        })
    }

    fn dispatch(&self, notifications: Vec<NotificationRequest>) -> DispatchHandle {
        if notifications.is_empty() {
            return DispatchHandle::completed();
        }

        let (handle, tracking) = DispatchHandle::new();
        let dispatcher = Arc::clone(&self.dispatcher);
        let policy = self.config.notification_retry.clone();

        tokio::spawn(async move {
            let _guard = CompletionGuard(tracking);
            join_all(
                notifications
                    .into_iter()
                    .map(|request| deliver(dispatcher.as_ref(), &policy, request)),
            )
            .await;
        });

        handle
    }
}

/// Deliver one notification. Failures are logged and counted, never propagated.
async fn deliver(
    dispatcher: &dyn NotificationDispatcher,
    policy: &RetryPolicy,
    request: NotificationRequest,
) {
    let outcome = request.outcome;
    let entrant_id = request.entrant_id.clone();
    let event_id = request.event_id.clone();

    let result = retry_with_predicate(
        policy,
        || dispatcher.notify(request.clone()),
        |err| matches!(err, NotificationError::Delivery(_)),
    )
    .await;

    match result {
        Ok(()) => {
            tracing::debug!(%event_id, %entrant_id, %outcome, "Notification delivered");
            LotteryMetrics::record_notification(outcome, true);
        }
        Err(error) => {
            tracing::warn!(%event_id, %entrant_id, %outcome, %error, "Notification delivery failed");
            LotteryMetrics::record_notification(outcome, false);
        }
    }
}

fn split_effects(
    effects: SmallVec<[Effect; 4]>,
) -> (Option<Box<EventRecord>>, Vec<NotificationRequest>) {
    let mut snapshot = None;
    let mut notifications = Vec::new();
    for effect in effects {
        match effect {
            Effect::Persist(record) => snapshot = Some(record),
            Effect::Notify(request) => notifications.push(request),
            Effect::None => {}
        }
    }
    (snapshot, notifications)
}

const fn selection_kind(action: &LotteryAction) -> Option<&'static str> {
    match action {
        LotteryAction::RunLottery | LotteryAction::MaybeAutoRun => Some("lottery"),
        LotteryAction::DrawReplacements => Some("replacement"),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use waitlist_lottery_testing::{InMemoryEventStore, RecordingDispatcher, test_environment};

    #[tokio::test]
    async fn test_completed_handle_does_not_block() {
        let mut handle = DispatchHandle::completed();
        assert!(!handle.is_pending());
        handle.wait().await;
    }

    #[tokio::test]
    async fn test_handle_completes_when_guard_drops() {
        let (mut handle, tracking) = DispatchHandle::new();
        assert!(handle.is_pending());

        tokio::spawn(async move {
            let _guard = CompletionGuard(tracking);
            tokio::task::yield_now().await;
        });

        assert!(handle.wait_with_timeout(Duration::from_secs(1)).await.is_ok());
        assert!(!handle.is_pending());
    }

    #[tokio::test]
    async fn test_unknown_event_leaves_no_lock_behind() {
        let store = Arc::new(InMemoryEventStore::new());
        let coordinator = Coordinator::new(
            store,
            Arc::new(RecordingDispatcher::new()),
            test_environment(1),
        );

        let result = coordinator
            .send(EventId::new("ghost"), LotteryAction::RunLottery)
            .await;
        assert!(matches!(result, Err(CoordinatorError::EventNotFound(_))));
        assert_eq!(coordinator.tracked_locks(), 0);

        coordinator
            .create_event(EventRecord::new(EventId::new("e1"), 1))
            .await
            .unwrap();
        coordinator
            .send(EventId::new("e1"), LotteryAction::OpenRegistration)
            .await
            .unwrap();
        assert_eq!(coordinator.tracked_locks(), 1);
    }

    #[test]
    fn test_selection_kind_labels() {
        assert_eq!(selection_kind(&LotteryAction::RunLottery), Some("lottery"));
        assert_eq!(selection_kind(&LotteryAction::DrawReplacements), Some("replacement"));
        assert_eq!(selection_kind(&LotteryAction::CancelEvent), None);
    }

    #[test]
    fn test_default_config_notifies_at_most_once() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.persist_max_attempts, 3);
        assert_eq!(config.notification_retry.total_attempts(), 1);
    }
}
