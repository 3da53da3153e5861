//! Lottery engine and reducer.
//!
//! [`LotteryEngine`] holds the allocation algorithms: the randomized main draw,
//! the in-order replacement backfill and the deadline-triggered auto-run. It is
//! stateless and works through a [`Roster`].
//!
//! [`LotteryReducer`] wraps the engine and the per-entrant roster operations in
//! the reducer shape: it mutates a [`LotteryState`] and returns a persistence
//! intent followed by notification intents. Nothing here performs I/O.
//!
//! ```text
//! RunLottery flow:
//! 1. Skip if already LotteryCompleted, waitlist empty, or no slots
//! 2. Shuffle waiting → snapshot
//! 3. Snapshot[..slots] → selected, rest stay waiting
//! 4. status = LotteryCompleted, lottery_has_run = true
//! 5. Persist, then notify Selected / NotSelected
//! ```

use crate::effect::Effect;
use crate::environment::{Clock, RandomSource};
use crate::event::{EntrantId, EventRecord, EventStatus, Location};
use crate::notification::{NotificationRequest, OutcomeKind};
use crate::reducer::Reducer;
use crate::roster::Roster;
use crate::{SmallVec, smallvec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Skip reasons
// ============================================================================

/// Why an action was a no-op.
///
/// A skip is an ordinary negative result ("no replacement drawn"), not an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The main lottery already ran for this event
    LotteryAlreadyCompleted,
    /// Auto-run requested but `lottery_has_run` is set
    LotteryAlreadyRun,
    /// Nobody is waiting
    EmptyWaitlist,
    /// Selected entrants already fill capacity
    NoAvailableSlots {
        /// Capacity of the event
        max_attendees: u32,
        /// Entrants already selected
        selected: usize,
    },
    /// Replacements requested before the main lottery
    LotteryNotRun,
    /// Replacement formula left no room
    NoOpenSlots {
        /// Computed open slots (may be negative)
        open_slots: i64,
    },
    /// Auto-run requested for an event with no registration deadline
    NoRegistrationDeadline,
    /// Auto-run requested before the registration deadline passed
    DeadlineNotReached,
    /// The event is completed or cancelled
    EventClosed {
        /// Current status
        status: EventStatus,
    },
    /// Registration is not accepting entrants
    RegistrationClosed,
    /// Registration start date is still in the future
    RegistrationNotOpen,
    /// The entrant is already on one of the rosters
    AlreadyOnRoster,
    /// The waiting list reached its cap
    WaitlistFull {
        /// The cap
        capacity: u32,
    },
    /// The event requires a join location and none was given
    LocationRequired,
    /// The entrant is not on the waiting list
    NotOnWaitlist,
    /// The entrant does not hold a slot
    NotSelected,
    /// The entrant already confirmed
    AlreadyConfirmed,
    /// The status transition is not allowed
    InvalidTransition {
        /// Current status
        from: EventStatus,
        /// Requested status
        to: EventStatus,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LotteryAlreadyCompleted => write!(f, "lottery already completed"),
            Self::LotteryAlreadyRun => write!(f, "lottery has already run"),
            Self::EmptyWaitlist => write!(f, "no entrants on the waiting list"),
            Self::NoAvailableSlots {
                max_attendees,
                selected,
            } => write!(
                f,
                "no available slots (max: {max_attendees}, already selected: {selected})"
            ),
            Self::LotteryNotRun => write!(f, "lottery has not been completed"),
            Self::NoOpenSlots { open_slots } => write!(f, "no open slots ({open_slots})"),
            Self::NoRegistrationDeadline => write!(f, "no registration end date"),
            Self::DeadlineNotReached => write!(f, "registration has not ended"),
            Self::EventClosed { status } => write!(f, "event is {status}"),
            Self::RegistrationClosed => write!(f, "registration is closed"),
            Self::RegistrationNotOpen => write!(f, "registration has not opened"),
            Self::AlreadyOnRoster => write!(f, "entrant is already registered"),
            Self::WaitlistFull { capacity } => write!(f, "waiting list is full ({capacity})"),
            Self::LocationRequired => write!(f, "a location is required to join"),
            Self::NotOnWaitlist => write!(f, "entrant is not on the waiting list"),
            Self::NotSelected => write!(f, "entrant is not selected"),
            Self::AlreadyConfirmed => write!(f, "entrant already confirmed"),
            Self::InvalidTransition { from, to } => {
                write!(f, "cannot move event from {from} to {to}")
            }
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Result of a draw
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Draw {
    /// Entrants moved into `selected`, in draw order
    pub selected: Vec<EntrantId>,
    /// Entrants in the draw snapshot who stayed on the waiting list
    pub not_selected: Vec<EntrantId>,
    /// Notifications to dispatch once the record is persisted
    pub notifications: Vec<NotificationRequest>,
    /// Why nothing happened, if nothing happened
    pub skipped: Option<SkipReason>,
}

impl Draw {
    fn skip(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// Whether at least one entrant was moved into `selected`
    #[must_use]
    pub fn drawn(&self) -> bool {
        !self.selected.is_empty()
    }
}

/// Stateless allocation algorithms
#[derive(Clone, Copy, Debug, Default)]
pub struct LotteryEngine;

impl LotteryEngine {
    /// Creates a new `LotteryEngine`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Runs the main draw.
    ///
    /// Shuffles the waiting list with `random`, then promotes entrants in
    /// shuffled order until the slots computed at entry are used up. Sets
    /// `status = LotteryCompleted` and `lottery_has_run = true`.
    ///
    /// Skips without touching the record if the lottery already completed, the
    /// event is closed, nobody is waiting, or capacity is already used.
    pub fn run_lottery(&self, roster: &mut Roster<'_>, random: &dyn RandomSource) -> Draw {
        let event = roster.event();
        if event.status == EventStatus::LotteryCompleted {
            tracing::info!(event_id = %event.event_id, "Lottery already completed");
            return Draw::skip(SkipReason::LotteryAlreadyCompleted);
        }
        if event.status.is_terminal() {
            tracing::info!(event_id = %event.event_id, status = %event.status, "Lottery skipped on closed event");
            return Draw::skip(SkipReason::EventClosed {
                status: event.status,
            });
        }
        if roster.waiting().is_empty() {
            tracing::info!(event_id = %event.event_id, "No entrants on waiting list");
            return Draw::skip(SkipReason::EmptyWaitlist);
        }

        let selected_count = roster.selected().len();
        let mut available_slots = i64::from(event.max_attendees) - len_i64(selected_count);
        if available_slots <= 0 {
            tracing::info!(
                event_id = %event.event_id,
                max_attendees = event.max_attendees,
                selected = selected_count,
                "No available slots"
            );
            return Draw::skip(SkipReason::NoAvailableSlots {
                max_attendees: event.max_attendees,
                selected: selected_count,
            });
        }

        roster.shuffle_waiting(random);
        let snapshot = roster.waiting().to_vec();

        let mut draw = Draw::default();
        for entrant_id in snapshot {
            if available_slots > 0 {
                roster.move_to_selected(&entrant_id);
                draw.selected.push(entrant_id);
                available_slots -= 1;
            } else {
                draw.not_selected.push(entrant_id);
            }
        }

        let event = roster.event_mut();
        event.status = EventStatus::LotteryCompleted;
        event.lottery_has_run = true;

        tracing::info!(
            event_id = %roster.event().event_id,
            selected = draw.selected.len(),
            not_selected = draw.not_selected.len(),
            "Lottery completed"
        );

        draw.notifications = roster.take_notifications_for(&draw.selected);
        let event = roster.event();
        draw.notifications.extend(draw.not_selected.iter().map(|id| {
            NotificationRequest::for_event(id.clone(), event, OutcomeKind::NotSelectedFromWaitlist)
        }));
        draw
    }

    /// Backfills freed slots from the waiting list, in waiting-list order.
    ///
    /// Open slots are computed as `max_attendees - selected + cancelled`:
    /// cancelled entrants are credited back as freed capacity. Status is left
    /// unchanged and entrants who stay waiting are not notified.
    pub fn draw_replacements(&self, roster: &mut Roster<'_>) -> Draw {
        let event = roster.event();
        if event.status != EventStatus::LotteryCompleted {
            tracing::info!(event_id = %event.event_id, status = %event.status, "Lottery has not been completed");
            return Draw::skip(SkipReason::LotteryNotRun);
        }
        if roster.waiting().is_empty() {
            tracing::info!(event_id = %event.event_id, "No entrants on waiting list for replacements");
            return Draw::skip(SkipReason::EmptyWaitlist);
        }

        // TODO: confirm with product whether a cancellation should free capacity
        // only once across successive replacement draws; this can overfill.
        let mut open_slots = i64::from(event.max_attendees) - len_i64(roster.selected().len())
            + len_i64(roster.cancelled().len());
        if open_slots <= 0 {
            tracing::info!(event_id = %event.event_id, open_slots, "No open slots for replacements");
            return Draw::skip(SkipReason::NoOpenSlots { open_slots });
        }

        let snapshot = roster.waiting().to_vec();
        let mut draw = Draw::default();
        for entrant_id in snapshot {
            if open_slots == 0 {
                break;
            }
            roster.move_to_selected(&entrant_id);
            draw.selected.push(entrant_id);
            open_slots -= 1;
        }

        tracing::info!(
            event_id = %roster.event().event_id,
            drawn = draw.selected.len(),
            "Drew replacements"
        );

        draw.notifications = roster.take_notifications_for(&draw.selected);
        draw
    }

    /// Runs the main draw if registration has ended and it never ran.
    ///
    /// The engine has no timer: callers invoke this whenever they load an event
    /// for display.
    pub fn maybe_auto_run(
        &self,
        roster: &mut Roster<'_>,
        random: &dyn RandomSource,
        now: DateTime<Utc>,
    ) -> Draw {
        let event = roster.event();
        if event.lottery_has_run {
            tracing::debug!(event_id = %event.event_id, "Auto-run skipped; lottery already run");
            return Draw::skip(SkipReason::LotteryAlreadyRun);
        }
        let Some(end) = event.registration_end_date else {
            return Draw::skip(SkipReason::NoRegistrationDeadline);
        };
        if now <= end {
            return Draw::skip(SkipReason::DeadlineNotReached);
        }

        tracing::debug!(event_id = %event.event_id, "Auto-running lottery after registration end");
        self.run_lottery(roster, random)
    }
}

fn len_i64(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

// ============================================================================
// Actions
// ============================================================================

/// Inputs to the [`LotteryReducer`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LotteryAction {
    /// Draft → `OpenForRegistration`
    OpenRegistration,
    /// `OpenForRegistration` → `RegistrationClosed`
    CloseRegistration,
    /// `LotteryCompleted` → `EventCompleted`
    CompleteEvent,
    /// Any non-terminal status → Cancelled
    CancelEvent,
    /// Add an entrant to the waiting list
    JoinWaitlist {
        /// Who is joining
        entrant_id: EntrantId,
        /// Where they joined from (required on geolocation events)
        location: Option<Location>,
    },
    /// Remove an entrant from the waiting list
    LeaveWaitlist {
        /// Who is leaving
        entrant_id: EntrantId,
    },
    /// Run the main draw
    RunLottery,
    /// Backfill freed slots
    DrawReplacements,
    /// Run the main draw if the registration deadline has passed
    MaybeAutoRun,
    /// A selected entrant confirms attendance
    AcceptInvitation {
        /// Who is confirming
        entrant_id: EntrantId,
    },
    /// A selected or confirmed entrant declines, or the organizer cancels them
    CancelEntrant {
        /// Who is cancelled
        entrant_id: EntrantId,
    },
}

impl LotteryAction {
    /// Stable label for logs and metrics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenRegistration => "open_registration",
            Self::CloseRegistration => "close_registration",
            Self::CompleteEvent => "complete_event",
            Self::CancelEvent => "cancel_event",
            Self::JoinWaitlist { .. } => "join_waitlist",
            Self::LeaveWaitlist { .. } => "leave_waitlist",
            Self::RunLottery => "run_lottery",
            Self::DrawReplacements => "draw_replacements",
            Self::MaybeAutoRun => "maybe_auto_run",
            Self::AcceptInvitation { .. } => "accept_invitation",
            Self::CancelEntrant { .. } => "cancel_entrant",
        }
    }
}

// ============================================================================
// State & Environment
// ============================================================================

/// Reducer state: one event plus the outcome of the last action
#[derive(Clone, Debug, PartialEq)]
pub struct LotteryState {
    /// The event being operated on
    pub event: EventRecord,
    /// Why the last action was skipped; `None` if it was applied
    pub last_skip: Option<SkipReason>,
}

impl LotteryState {
    /// Creates state over a loaded record
    #[must_use]
    pub const fn new(event: EventRecord) -> Self {
        Self {
            event,
            last_skip: None,
        }
    }
}

/// Environment dependencies for the lottery reducer
#[derive(Clone)]
pub struct LotteryEnvironment {
    /// Clock for deadline checks
    pub clock: Arc<dyn Clock>,
    /// Random source for the main draw
    pub random: Arc<dyn RandomSource>,
}

impl LotteryEnvironment {
    /// Creates a new `LotteryEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self { clock, random }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for one event's waitlist and lottery
#[derive(Clone, Copy, Debug, Default)]
pub struct LotteryReducer {
    engine: LotteryEngine,
}

type Applied = Result<Vec<NotificationRequest>, SkipReason>;

impl LotteryReducer {
    /// Creates a new `LotteryReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            engine: LotteryEngine::new(),
        }
    }

    fn transition(event: &mut EventRecord, to: EventStatus) -> Applied {
        event
            .transition_to(to)
            .map(|from| {
                tracing::info!(event_id = %event.event_id, %from, %to, "Event status changed");
                Vec::new()
            })
            .map_err(|from| SkipReason::InvalidTransition { from, to })
    }

    fn join_waitlist(
        event: &mut EventRecord,
        entrant_id: &EntrantId,
        location: Option<Location>,
        now: DateTime<Utc>,
    ) -> Applied {
        if event.status.is_terminal() {
            return Err(SkipReason::EventClosed {
                status: event.status,
            });
        }
        if event.lottery_has_run
            || matches!(
                event.status,
                EventStatus::RegistrationClosed | EventStatus::LotteryCompleted
            )
            || event.registration_ended(now)
        {
            return Err(SkipReason::RegistrationClosed);
        }
        if event.registration_not_yet_open(now) {
            return Err(SkipReason::RegistrationNotOpen);
        }
        if event.geolocation_required && location.is_none() {
            return Err(SkipReason::LocationRequired);
        }

        let mut roster = Roster::new(event);
        if roster.contains(entrant_id) {
            return Err(SkipReason::AlreadyOnRoster);
        }
        if roster.event().waiting_list_full() {
            return Err(SkipReason::WaitlistFull {
                capacity: roster.event().max_waiting_list_size,
            });
        }

        roster.add_to_waiting(entrant_id);
        if let Some(location) = location {
            roster.record_location(entrant_id, location);
        }
        tracing::info!(event_id = %roster.event().event_id, %entrant_id, "Entrant joined waiting list");
        Ok(Vec::new())
    }

    fn leave_waitlist(event: &mut EventRecord, entrant_id: &EntrantId) -> Applied {
        let mut roster = Roster::new(event);
        if !roster.remove_from_waiting(entrant_id) {
            return Err(SkipReason::NotOnWaitlist);
        }
        tracing::info!(event_id = %roster.event().event_id, %entrant_id, "Entrant left waiting list");
        Ok(Vec::new())
    }

    fn accept_invitation(event: &mut EventRecord, entrant_id: &EntrantId) -> Applied {
        if event.status.is_terminal() {
            return Err(SkipReason::EventClosed {
                status: event.status,
            });
        }
        let mut roster = Roster::new(event);
        if !roster.selected().contains(entrant_id) {
            return Err(SkipReason::NotSelected);
        }
        if !roster.add_to_confirmed(entrant_id) {
            return Err(SkipReason::AlreadyConfirmed);
        }
        tracing::info!(event_id = %roster.event().event_id, %entrant_id, "Entrant confirmed attendance");
        Ok(vec![NotificationRequest::for_event(
            entrant_id.clone(),
            roster.event(),
            OutcomeKind::Confirmed,
        )])
    }

    fn cancel_entrant(event: &mut EventRecord, entrant_id: &EntrantId) -> Applied {
        if event.status.is_terminal() {
            return Err(SkipReason::EventClosed {
                status: event.status,
            });
        }
        let mut roster = Roster::new(event);
        if !roster.selected().contains(entrant_id) && !roster.confirmed().contains(entrant_id) {
            return Err(SkipReason::NotSelected);
        }
        roster.move_to_cancelled(entrant_id);
        tracing::info!(event_id = %roster.event().event_id, %entrant_id, "Entrant cancelled");
        Ok(vec![NotificationRequest::for_event(
            entrant_id.clone(),
            roster.event(),
            OutcomeKind::Cancelled,
        )])
    }

    fn from_draw(draw: Draw) -> Applied {
        match draw.skipped {
            Some(reason) => Err(reason),
            None => Ok(draw.notifications),
        }
    }
}

impl Reducer for LotteryReducer {
    type State = LotteryState;
    type Action = LotteryAction;
    type Environment = LotteryEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect; 4]> {
        let action_name = action.name();
        let event = &mut state.event;

        let applied = match action {
            LotteryAction::OpenRegistration => {
                Self::transition(event, EventStatus::OpenForRegistration)
            }
            LotteryAction::CloseRegistration => {
                Self::transition(event, EventStatus::RegistrationClosed)
            }
            LotteryAction::CompleteEvent => Self::transition(event, EventStatus::EventCompleted),
            LotteryAction::CancelEvent => Self::transition(event, EventStatus::Cancelled),
            LotteryAction::JoinWaitlist {
                entrant_id,
                location,
            } => Self::join_waitlist(event, &entrant_id, location, env.clock.now()),
            LotteryAction::LeaveWaitlist { entrant_id } => Self::leave_waitlist(event, &entrant_id),
            LotteryAction::RunLottery => {
                let mut roster = Roster::new(event);
                Self::from_draw(self.engine.run_lottery(&mut roster, env.random.as_ref()))
            }
            LotteryAction::DrawReplacements => {
                let mut roster = Roster::new(event);
                Self::from_draw(self.engine.draw_replacements(&mut roster))
            }
            LotteryAction::MaybeAutoRun => {
                let mut roster = Roster::new(event);
                Self::from_draw(self.engine.maybe_auto_run(
                    &mut roster,
                    env.random.as_ref(),
                    env.clock.now(),
                ))
            }
            LotteryAction::AcceptInvitation { entrant_id } => {
                Self::accept_invitation(event, &entrant_id)
            }
            LotteryAction::CancelEntrant { entrant_id } => Self::cancel_entrant(event, &entrant_id),
        };

        match applied {
            Ok(notifications) => {
                state.last_skip = None;
                let mut effects: SmallVec<[Effect; 4]> =
                    smallvec![Effect::Persist(Box::new(state.event.clone()))];
                effects.extend(notifications.into_iter().map(Effect::Notify));
                effects
            }
            Err(reason) => {
                tracing::debug!(
                    event_id = %state.event.event_id,
                    action = action_name,
                    %reason,
                    "Action skipped"
                );
                state.last_skip = Some(reason);
                SmallVec::new()
            }
        }
    }
}
