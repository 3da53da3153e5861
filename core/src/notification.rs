//! Notification requests and the dispatcher collaborator.
//!
//! The engine never delivers anything. It produces [`NotificationRequest`]s that
//! the caller hands to a [`NotificationDispatcher`]. Delivery is at-most-once and
//! best-effort: a failure for one entrant is logged and does not affect the
//! others or the roster change that caused it.

use crate::BoxFuture;
use crate::event::{EntrantId, EventId, EventRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What happened to an entrant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    /// Entrant moved from the waiting list into a slot
    SelectedFromWaitlist,
    /// Entrant was in the lottery draw but stays on the waiting list
    NotSelectedFromWaitlist,
    /// Entrant's registration was cancelled
    Cancelled,
    /// Entrant confirmed attendance
    Confirmed,
}

impl OutcomeKind {
    /// Stable label for logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SelectedFromWaitlist => "selected_from_waitlist",
            Self::NotSelectedFromWaitlist => "not_selected_from_waitlist",
            Self::Cancelled => "cancelled",
            Self::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Entrant X, event Y, outcome Z"
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    /// Who to notify
    pub entrant_id: EntrantId,
    /// Which event
    pub event_id: EventId,
    /// Event title at the time of the transition
    pub event_title: String,
    /// What happened
    pub outcome: OutcomeKind,
}

impl NotificationRequest {
    /// Creates a request for `entrant_id` about `event`
    #[must_use]
    pub fn for_event(entrant_id: EntrantId, event: &EventRecord, outcome: OutcomeKind) -> Self {
        Self {
            entrant_id,
            event_id: event.event_id.clone(),
            event_title: event.display_title().to_string(),
            outcome,
        }
    }

    /// User-facing message for this outcome
    #[must_use]
    pub fn message(&self) -> String {
        let title = &self.event_title;
        match self.outcome {
            OutcomeKind::SelectedFromWaitlist => {
                format!("You have been selected to participate in {title}!")
            }
            OutcomeKind::NotSelectedFromWaitlist => {
                format!("You were not selected in the lottery for {title}. You remain on the waiting list.")
            }
            OutcomeKind::Cancelled => format!("Your registration for {title} has been cancelled."),
            OutcomeKind::Confirmed => format!("You have confirmed your attendance at {title}."),
        }
    }
}

/// Errors reported by a [`NotificationDispatcher`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// The delivery channel failed (network, backend outage)
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// The channel refused this particular request
    #[error("Notification for entrant {entrant_id} rejected: {reason}")]
    Rejected {
        /// Entrant the request was for
        entrant_id: EntrantId,
        /// Why it was refused
        reason: String,
    },
}

/// Delivery channel for entrant notifications.
///
/// # Dyn Compatibility
///
/// Returns `Pin<Box<dyn Future>>` so dispatchers can be shared as
/// `Arc<dyn NotificationDispatcher>`.
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notification
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError`] when the request could not be delivered.
    /// Callers log the failure; the engine never retries on its own.
    fn notify(&self, request: NotificationRequest) -> BoxFuture<'_, Result<(), NotificationError>>;
}
