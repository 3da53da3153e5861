//! Event records for the waitlist lottery.
//!
//! An [`EventRecord`] is the single source of truth for one event: capacity,
//! lifecycle status, registration deadlines and the four participant rosters.
//! It is stored as one document and replaced wholesale on every write, guarded
//! by the `version` concurrency token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Waiting list cap applied when an event is created without one
pub const DEFAULT_MAX_WAITING_LIST_SIZE: u32 = 1000;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a `", stringify!($name), "` from an opaque string")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

opaque_id!(
    /// Stable identifier of an event, assigned once at creation
    EventId
);

opaque_id!(
    /// Opaque identifier of a registrant
    EntrantId
);

opaque_id!(
    /// Identifier of the organizer who owns an event
    OrganizerId
);

impl EventId {
    /// Generates a fresh random `EventId`
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// ============================================================================
// Status
// ============================================================================

/// Event lifecycle status
///
/// ```text
/// Draft → OpenForRegistration → RegistrationClosed → LotteryCompleted → EventCompleted
///   └──────────────┴────────────────────┴────────────────────┴──→ Cancelled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Event is being configured
    Draft,
    /// Entrants may join the waiting list
    OpenForRegistration,
    /// Registration has ended, lottery not yet drawn
    RegistrationClosed,
    /// The main lottery has been drawn
    LotteryCompleted,
    /// The event has taken place
    EventCompleted,
    /// The event was called off
    Cancelled,
}

impl EventStatus {
    /// Terminal states accept no further transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::EventCompleted | Self::Cancelled)
    }

    /// Whether the state machine permits moving from `self` to `next`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Draft, Self::OpenForRegistration)
            | (Self::OpenForRegistration, Self::RegistrationClosed)
            | (Self::RegistrationClosed, Self::LotteryCompleted)
            | (Self::LotteryCompleted, Self::EventCompleted) => true,
            (from, Self::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Draft => "draft",
            Self::OpenForRegistration => "open_for_registration",
            Self::RegistrationClosed => "registration_closed",
            Self::LotteryCompleted => "lottery_completed",
            Self::EventCompleted => "event_completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Record
// ============================================================================

/// Where an entrant was when joining the waiting list
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl Location {
    /// Creates a new `Location`
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// The persisted event document.
///
/// Rosters are always materialized: a document whose roster fields are missing
/// or `null` deserializes with empty rosters, so roster invariants hold without
/// null checks at call sites.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Event identifier
    pub event_id: EventId,
    /// Owning organizer
    #[serde(default)]
    pub organizer_id: Option<OrganizerId>,
    /// Display title used in notifications
    #[serde(default)]
    pub title: Option<String>,
    /// Number of slots available to selected entrants
    pub max_attendees: u32,
    /// Waiting list cap (0 means uncapped)
    #[serde(default = "default_max_waiting_list_size")]
    pub max_waiting_list_size: u32,
    /// When registration opens
    #[serde(default)]
    pub registration_start_date: Option<DateTime<Utc>>,
    /// When registration closes; passing it makes the lottery eligible to auto-run
    #[serde(default)]
    pub registration_end_date: Option<DateTime<Utc>>,
    /// Lifecycle status
    pub status: EventStatus,
    /// Set once by the main lottery, never cleared
    #[serde(default)]
    pub lottery_has_run: bool,
    /// Whether joining the waiting list requires a location
    #[serde(default)]
    pub geolocation_required: bool,
    /// Entrants waiting for a slot
    #[serde(default, deserialize_with = "null_as_default")]
    pub waiting_list: Vec<EntrantId>,
    /// Entrants holding a slot
    #[serde(default, deserialize_with = "null_as_default")]
    pub selected_attendees: Vec<EntrantId>,
    /// Selected entrants who confirmed attendance (a subset of selected)
    #[serde(default, deserialize_with = "null_as_default")]
    pub confirmed_attendees: Vec<EntrantId>,
    /// Entrants who declined or were cancelled
    #[serde(default, deserialize_with = "null_as_default")]
    pub cancelled_attendees: Vec<EntrantId>,
    /// Join locations of waiting entrants
    #[serde(default, deserialize_with = "null_as_default")]
    pub waiting_list_locations: HashMap<EntrantId, Location>,
    /// Optimistic concurrency token, bumped by the store on every write
    #[serde(default)]
    pub version: u64,
}

impl EventRecord {
    /// Creates a draft event with empty rosters
    #[must_use]
    pub fn new(event_id: EventId, max_attendees: u32) -> Self {
        Self {
            event_id,
            organizer_id: None,
            title: None,
            max_attendees,
            max_waiting_list_size: DEFAULT_MAX_WAITING_LIST_SIZE,
            registration_start_date: None,
            registration_end_date: None,
            status: EventStatus::Draft,
            lottery_has_run: false,
            geolocation_required: false,
            waiting_list: Vec::new(),
            selected_attendees: Vec::new(),
            confirmed_attendees: Vec::new(),
            cancelled_attendees: Vec::new(),
            waiting_list_locations: HashMap::new(),
            version: 0,
        }
    }

    /// Sets the display title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the owning organizer
    #[must_use]
    pub fn with_organizer(mut self, organizer_id: OrganizerId) -> Self {
        self.organizer_id = Some(organizer_id);
        self
    }

    /// Sets the registration window
    #[must_use]
    pub fn with_registration_window(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.registration_start_date = start;
        self.registration_end_date = end;
        self
    }

    /// Sets the waiting list cap (0 means uncapped)
    #[must_use]
    pub fn with_max_waiting_list_size(mut self, size: u32) -> Self {
        self.max_waiting_list_size = size;
        self
    }

    /// Requires a location when joining the waiting list
    #[must_use]
    pub fn with_geolocation_required(mut self, required: bool) -> Self {
        self.geolocation_required = required;
        self
    }

    /// Sets the lifecycle status
    #[must_use]
    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// Title used in notifications, falling back to a generic label
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Event")
    }

    /// Whether the registration deadline is set and `now` is past it
    #[must_use]
    pub fn registration_ended(&self, now: DateTime<Utc>) -> bool {
        self.registration_end_date.is_some_and(|end| now > end)
    }

    /// Whether registration has a start date still in the future
    #[must_use]
    pub fn registration_not_yet_open(&self, now: DateTime<Utc>) -> bool {
        self.registration_start_date.is_some_and(|start| now < start)
    }

    /// Whether the waiting list has reached its cap
    #[must_use]
    pub fn waiting_list_full(&self) -> bool {
        self.max_waiting_list_size > 0
            && self.waiting_list.len() >= self.max_waiting_list_size as usize
    }

    /// Moves to `next` if the state machine allows it, returning the old status
    ///
    /// # Errors
    ///
    /// Returns the current status unchanged when the transition is not permitted.
    pub fn transition_to(&mut self, next: EventStatus) -> Result<EventStatus, EventStatus> {
        if self.status.can_transition_to(next) {
            let previous = self.status;
            self.status = next;
            Ok(previous)
        } else {
            Err(self.status)
        }
    }
}

const fn default_max_waiting_list_size() -> u32 {
    DEFAULT_MAX_WAITING_LIST_SIZE
}

/// Treats an explicit `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_event_defaults() {
        let event = EventRecord::new(EventId::new("e1"), 10);
        assert_eq!(event.status, EventStatus::Draft);
        assert_eq!(event.max_waiting_list_size, DEFAULT_MAX_WAITING_LIST_SIZE);
        assert!(!event.lottery_has_run);
        assert!(event.waiting_list.is_empty());
        assert_eq!(event.version, 0);
    }

    #[test]
    fn test_null_and_missing_rosters_deserialize_as_empty() {
        let json = r#"{
            "eventId": "e1",
            "maxAttendees": 3,
            "status": "OPEN_FOR_REGISTRATION",
            "waitingList": null,
            "selectedAttendees": ["a"],
            "waitingListLocations": null
        }"#;

        let event: EventRecord = serde_json::from_str(json).unwrap();
        assert!(event.waiting_list.is_empty());
        assert_eq!(event.selected_attendees, vec![EntrantId::new("a")]);
        assert!(event.confirmed_attendees.is_empty());
        assert!(event.cancelled_attendees.is_empty());
        assert!(event.waiting_list_locations.is_empty());
        assert_eq!(event.max_waiting_list_size, DEFAULT_MAX_WAITING_LIST_SIZE);
        assert_eq!(event.status, EventStatus::OpenForRegistration);
    }

    #[test]
    fn test_serializes_with_document_field_names() {
        let event = EventRecord::new(EventId::new("e1"), 2).with_title("Gala");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventId"], "e1");
        assert_eq!(value["maxAttendees"], 2);
        assert_eq!(value["status"], "DRAFT");
        assert_eq!(value["lotteryHasRun"], false);
        assert!(value["waitingList"].is_array());
    }

    #[test]
    fn test_state_machine_forward_path() {
        let mut event = EventRecord::new(EventId::new("e1"), 2);
        assert!(event.transition_to(EventStatus::OpenForRegistration).is_ok());
        assert!(event.transition_to(EventStatus::RegistrationClosed).is_ok());
        assert!(event.transition_to(EventStatus::LotteryCompleted).is_ok());
        assert!(event.transition_to(EventStatus::EventCompleted).is_ok());
        assert!(event.status.is_terminal());
    }

    #[test]
    fn test_cancel_reachable_from_non_terminal_only() {
        for status in [
            EventStatus::Draft,
            EventStatus::OpenForRegistration,
            EventStatus::RegistrationClosed,
            EventStatus::LotteryCompleted,
        ] {
            assert!(status.can_transition_to(EventStatus::Cancelled));
        }
        assert!(!EventStatus::EventCompleted.can_transition_to(EventStatus::Cancelled));
        assert!(!EventStatus::Cancelled.can_transition_to(EventStatus::Cancelled));
    }

    #[test]
    fn test_lottery_completed_only_after_registration_closed() {
        assert!(!EventStatus::Draft.can_transition_to(EventStatus::LotteryCompleted));
        assert!(!EventStatus::OpenForRegistration.can_transition_to(EventStatus::LotteryCompleted));
        assert!(EventStatus::RegistrationClosed.can_transition_to(EventStatus::LotteryCompleted));
    }

    #[test]
    fn test_invalid_transition_keeps_status() {
        let mut event = EventRecord::new(EventId::new("e1"), 2);
        assert_eq!(
            event.transition_to(EventStatus::EventCompleted),
            Err(EventStatus::Draft)
        );
        assert_eq!(event.status, EventStatus::Draft);
    }

    #[test]
    fn test_registration_window_checks() {
        let now = Utc::now();
        let event = EventRecord::new(EventId::new("e1"), 2)
            .with_registration_window(Some(now + Duration::hours(1)), Some(now - Duration::hours(1)));
        assert!(event.registration_ended(now));
        assert!(event.registration_not_yet_open(now));

        let open = EventRecord::new(EventId::new("e2"), 2);
        assert!(!open.registration_ended(now));
        assert!(!open.registration_not_yet_open(now));
    }

    #[test]
    fn test_waiting_list_full_respects_zero_as_uncapped() {
        let mut event = EventRecord::new(EventId::new("e1"), 2).with_max_waiting_list_size(1);
        event.waiting_list.push(EntrantId::new("a"));
        assert!(event.waiting_list_full());

        event.max_waiting_list_size = 0;
        assert!(!event.waiting_list_full());
    }

    #[test]
    fn test_display_title_fallback() {
        let event = EventRecord::new(EventId::new("e1"), 2);
        assert_eq!(event.display_title(), "Event");
        assert_eq!(event.with_title("Gala").display_title(), "Gala");
    }
}
