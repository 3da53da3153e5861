//! Notification dispatchers for tests

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use waitlist_lottery_core::BoxFuture;
use waitlist_lottery_core::event::EntrantId;
use waitlist_lottery_core::notification::{
    NotificationDispatcher, NotificationError, NotificationRequest, OutcomeKind,
};

/// Records every delivered request.
///
/// Entrants registered with [`RecordingDispatcher::reject`] get
/// [`NotificationError::Rejected`] instead, so tests can check that one failed
/// delivery does not affect the others.
#[derive(Clone, Debug, Default)]
pub struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<NotificationRequest>>>,
    rejected: Arc<Mutex<HashSet<EntrantId>>>,
}

impl RecordingDispatcher {
    /// Create a dispatcher that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject all future requests for `entrant_id`
    pub fn reject(&self, entrant_id: EntrantId) {
        self.rejected.lock().unwrap().insert(entrant_id);
    }

    /// Requests delivered so far, in delivery order
    #[must_use]
    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Entrants who received a notification with `outcome`
    #[must_use]
    pub fn recipients(&self, outcome: OutcomeKind) -> Vec<EntrantId> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.outcome == outcome)
            .map(|request| request.entrant_id.clone())
            .collect()
    }

    /// Number of delivered requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Check if nothing was delivered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.lock().unwrap().is_empty()
    }

    /// Forget delivered requests
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn notify(&self, request: NotificationRequest) -> BoxFuture<'_, Result<(), NotificationError>> {
        Box::pin(async move {
            if self.rejected.lock().unwrap().contains(&request.entrant_id) {
                return Err(NotificationError::Rejected {
                    entrant_id: request.entrant_id,
                    reason: "recipient unreachable".to_string(),
                });
            }
            self.sent.lock().unwrap().push(request);
            Ok(())
        })
    }
}

/// Fails the first `failures` attempts with [`NotificationError::Delivery`],
/// then records like a [`RecordingDispatcher`]
#[derive(Clone, Debug)]
pub struct FailingDispatcher {
    failures: usize,
    attempts: Arc<AtomicUsize>,
    inner: RecordingDispatcher,
}

impl FailingDispatcher {
    /// Fail every attempt
    #[must_use]
    pub fn always() -> Self {
        Self::times(usize::MAX)
    }

    /// Fail the first `failures` attempts, then succeed
    #[must_use]
    pub fn times(failures: usize) -> Self {
        Self {
            failures,
            attempts: Arc::new(AtomicUsize::new(0)),
            inner: RecordingDispatcher::new(),
        }
    }

    /// Number of delivery attempts, failed or not
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Requests that eventually got through
    #[must_use]
    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.inner.sent()
    }
}

impl NotificationDispatcher for FailingDispatcher {
    fn notify(&self, request: NotificationRequest) -> BoxFuture<'_, Result<(), NotificationError>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Box::pin(async {
                Err(NotificationError::Delivery("channel unavailable".to_string()))
            });
        }
        self.inner.notify(request)
    }
}
