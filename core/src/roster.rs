//! Roster mutation primitives.
//!
//! A [`Roster`] is a transient capability surface over one [`EventRecord`]'s
//! four rosters. It owns no storage: every mutation lands directly on the
//! borrowed record, which stays the single source of truth.
//!
//! # Invariants
//!
//! - **Cross-roster uniqueness**: an entrant is in at most one of `waiting`,
//!   `selected` and `cancelled`. `confirmed` is layered on top of `selected`
//!   (a confirmed entrant is still selected) and is never mixed with the others.
//! - **Idempotent insertion**: adding an entrant already present is a no-op.
//! - **Lenient removal**: removing an absent entrant is a no-op.
//!
//! Per-entrant moves that notify (`move_to_selected`) queue a
//! [`NotificationRequest`] on the roster instead of sending it; the caller drains
//! them with [`Roster::take_notifications`] or [`Roster::take_notifications_for`].

use crate::environment::RandomSource;
use crate::event::{EntrantId, EventRecord, Location};
use crate::notification::{NotificationRequest, OutcomeKind};

/// Per-operation wrapper over an event's rosters
#[derive(Debug)]
pub struct Roster<'a> {
    event: &'a mut EventRecord,
    pending: Vec<NotificationRequest>,
}

impl<'a> Roster<'a> {
    /// Wraps `event` for one operation
    #[must_use]
    pub const fn new(event: &'a mut EventRecord) -> Self {
        Self {
            event,
            pending: Vec::new(),
        }
    }

    /// The underlying record
    #[must_use]
    pub fn event(&self) -> &EventRecord {
        self.event
    }

    pub(crate) fn event_mut(&mut self) -> &mut EventRecord {
        self.event
    }

    /// Entrants waiting for a slot
    #[must_use]
    pub fn waiting(&self) -> &[EntrantId] {
        &self.event.waiting_list
    }

    /// Entrants holding a slot
    #[must_use]
    pub fn selected(&self) -> &[EntrantId] {
        &self.event.selected_attendees
    }

    /// Selected entrants who confirmed
    #[must_use]
    pub fn confirmed(&self) -> &[EntrantId] {
        &self.event.confirmed_attendees
    }

    /// Entrants who declined or were cancelled
    #[must_use]
    pub fn cancelled(&self) -> &[EntrantId] {
        &self.event.cancelled_attendees
    }

    /// Whether `id` appears on any roster
    #[must_use]
    pub fn contains(&self, id: &EntrantId) -> bool {
        self.waiting().contains(id)
            || self.selected().contains(id)
            || self.confirmed().contains(id)
            || self.cancelled().contains(id)
    }

    /// Inserts `id` into `waiting`. Returns `false` if it was already there.
    pub fn add_to_waiting(&mut self, id: &EntrantId) -> bool {
        insert_unique(&mut self.event.waiting_list, id)
    }

    /// Removes `id` from `waiting` and forgets its join location.
    /// Returns `false` if it was not waiting.
    pub fn remove_from_waiting(&mut self, id: &EntrantId) -> bool {
        self.event.waiting_list_locations.remove(id);
        remove(&mut self.event.waiting_list, id)
    }

    /// Records where `id` joined from
    pub fn record_location(&mut self, id: &EntrantId, location: Location) {
        self.event
            .waiting_list_locations
            .insert(id.clone(), location);
    }

    /// Moves `id` from `waiting` into `selected` and queues a
    /// `SelectedFromWaitlist` notification.
    ///
    /// Returns `false` (and queues nothing) if `id` was already selected.
    pub fn move_to_selected(&mut self, id: &EntrantId) -> bool {
        remove(&mut self.event.waiting_list, id);
        if !insert_unique(&mut self.event.selected_attendees, id) {
            return false;
        }
        self.pending.push(NotificationRequest::for_event(
            id.clone(),
            self.event,
            OutcomeKind::SelectedFromWaitlist,
        ));
        true
    }

    /// Moves `id` into `cancelled`, removing it from `selected` and `confirmed`.
    ///
    /// Does not draw a replacement; that is an explicit engine operation.
    /// Returns `false` if `id` was already cancelled.
    pub fn move_to_cancelled(&mut self, id: &EntrantId) -> bool {
        remove(&mut self.event.selected_attendees, id);
        remove(&mut self.event.confirmed_attendees, id);
        insert_unique(&mut self.event.cancelled_attendees, id)
    }

    /// Inserts `id` into `confirmed`. The entrant stays in `selected`.
    /// Returns `false` if it was already confirmed.
    pub fn add_to_confirmed(&mut self, id: &EntrantId) -> bool {
        insert_unique(&mut self.event.confirmed_attendees, id)
    }

    /// Applies a uniform permutation to `waiting`
    pub fn shuffle_waiting(&mut self, random: &dyn RandomSource) {
        random.shuffle(&mut self.event.waiting_list);
    }

    /// Notifications queued by moves since the last drain
    #[must_use]
    pub fn pending_notifications(&self) -> &[NotificationRequest] {
        &self.pending
    }

    /// Drains queued notifications
    pub fn take_notifications(&mut self) -> Vec<NotificationRequest> {
        std::mem::take(&mut self.pending)
    }

    /// Drains queued notifications addressed to `ids`, leaving the rest queued
    pub fn take_notifications_for(&mut self, ids: &[EntrantId]) -> Vec<NotificationRequest> {
        let (taken, kept) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|request| ids.contains(&request.entrant_id));
        self.pending = kept;
        taken
    }
}

fn insert_unique(list: &mut Vec<EntrantId>, id: &EntrantId) -> bool {
    if list.contains(id) {
        return false;
    }
    list.push(id.clone());
    true
}

fn remove(list: &mut Vec<EntrantId>, id: &EntrantId) -> bool {
    let before = list.len();
    list.retain(|existing| existing != id);
    list.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventId;
    use proptest::prelude::*;

    fn ids(names: &[&str]) -> Vec<EntrantId> {
        names.iter().map(|n| EntrantId::new(*n)).collect()
    }

    fn event_with_waiting(names: &[&str]) -> EventRecord {
        let mut event = EventRecord::new(EventId::new("e1"), 2).with_title("Gala");
        event.waiting_list = ids(names);
        event
    }

    #[test]
    fn test_add_to_waiting_is_idempotent() {
        let mut event = EventRecord::new(EventId::new("e1"), 2);
        let mut roster = Roster::new(&mut event);
        let a = EntrantId::new("a");

        assert!(roster.add_to_waiting(&a));
        assert!(!roster.add_to_waiting(&a));
        assert_eq!(roster.waiting().len(), 1);
    }

    #[test]
    fn test_move_to_selected_moves_and_notifies_once() {
        let mut event = event_with_waiting(&["a", "b"]);
        let mut roster = Roster::new(&mut event);
        let a = EntrantId::new("a");

        assert!(roster.move_to_selected(&a));
        assert!(!roster.waiting().contains(&a));
        assert!(roster.selected().contains(&a));

        assert!(!roster.move_to_selected(&a));
        assert_eq!(roster.selected().len(), 1);

        let notifications = roster.take_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].outcome, OutcomeKind::SelectedFromWaitlist);
        assert_eq!(notifications[0].event_title, "Gala");
        assert!(roster.pending_notifications().is_empty());
    }

    #[test]
    fn test_move_to_cancelled_clears_selected_and_confirmed() {
        let mut event = event_with_waiting(&[]);
        event.selected_attendees = ids(&["a", "b"]);
        event.confirmed_attendees = ids(&["a"]);
        let mut roster = Roster::new(&mut event);
        let a = EntrantId::new("a");

        assert!(roster.move_to_cancelled(&a));
        assert_eq!(roster.selected(), ids(&["b"]).as_slice());
        assert!(roster.confirmed().is_empty());
        assert_eq!(roster.cancelled(), ids(&["a"]).as_slice());

        assert!(!roster.move_to_cancelled(&a));
        assert_eq!(roster.cancelled().len(), 1);
        assert!(roster.pending_notifications().is_empty());
    }

    #[test]
    fn test_add_to_confirmed_keeps_selected() {
        let mut event = event_with_waiting(&[]);
        event.selected_attendees = ids(&["a"]);
        let mut roster = Roster::new(&mut event);
        let a = EntrantId::new("a");

        assert!(roster.add_to_confirmed(&a));
        assert!(!roster.add_to_confirmed(&a));
        assert!(roster.selected().contains(&a));
        assert_eq!(roster.confirmed().len(), 1);
    }

    #[test]
    fn test_removing_absent_entrant_is_noop() {
        let mut event = event_with_waiting(&["a"]);
        let mut roster = Roster::new(&mut event);
        let ghost = EntrantId::new("ghost");

        assert!(!roster.remove_from_waiting(&ghost));
        roster.move_to_cancelled(&ghost);
        assert_eq!(roster.waiting().len(), 1);
        assert!(roster.selected().is_empty());
    }

    #[test]
    fn test_take_notifications_for_leaves_others_queued() {
        let mut event = event_with_waiting(&["a", "b"]);
        let mut roster = Roster::new(&mut event);
        roster.move_to_selected(&EntrantId::new("a"));
        roster.move_to_selected(&EntrantId::new("b"));

        let taken = roster.take_notifications_for(&ids(&["b"]));

        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].entrant_id, EntrantId::new("b"));
        assert_eq!(roster.pending_notifications().len(), 1);
        assert_eq!(roster.pending_notifications()[0].entrant_id, EntrantId::new("a"));
    }

    #[test]
    fn test_remove_from_waiting_drops_location() {
        let mut event = event_with_waiting(&[]);
        let mut roster = Roster::new(&mut event);
        let a = EntrantId::new("a");

        roster.add_to_waiting(&a);
        roster.record_location(&a, Location::new(53.5, -113.5));
        assert!(roster.remove_from_waiting(&a));
        assert!(roster.event().waiting_list_locations.is_empty());
    }

    #[test]
    fn test_mutations_land_on_record() {
        let mut event = event_with_waiting(&["a"]);
        {
            let mut roster = Roster::new(&mut event);
            roster.move_to_selected(&EntrantId::new("a"));
        }
        assert!(event.waiting_list.is_empty());
        assert_eq!(event.selected_attendees, ids(&["a"]));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Wait(u8),
        Select(u8),
        Cancel(u8),
        Confirm(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8).prop_map(Op::Wait),
            (0u8..8).prop_map(Op::Select),
            (0u8..8).prop_map(Op::Cancel),
            (0u8..8).prop_map(Op::Confirm),
        ]
    }

    proptest! {
        #[test]
        fn prop_rosters_never_hold_duplicates(ops in prop::collection::vec(op(), 0..64)) {
            let mut event = EventRecord::new(EventId::new("e1"), 4);
            let mut roster = Roster::new(&mut event);

            for op in ops {
                match op {
                    Op::Wait(n) => {
                        let id = EntrantId::new(n.to_string());
                        if !roster.contains(&id) {
                            roster.add_to_waiting(&id);
                        }
                    }
                    Op::Select(n) => {
                        let id = EntrantId::new(n.to_string());
                        if roster.waiting().contains(&id) {
                            roster.move_to_selected(&id);
                        }
                    }
                    Op::Cancel(n) => {
                        let id = EntrantId::new(n.to_string());
                        if roster.selected().contains(&id) {
                            roster.move_to_cancelled(&id);
                        }
                    }
                    Op::Confirm(n) => {
                        let id = EntrantId::new(n.to_string());
                        if roster.selected().contains(&id) {
                            roster.add_to_confirmed(&id);
                        }
                    }
                }
            }

            let event = roster.event();
            for list in [
                &event.waiting_list,
                &event.selected_attendees,
                &event.confirmed_attendees,
                &event.cancelled_attendees,
            ] {
                let mut sorted = list.clone();
                sorted.sort();
                sorted.dedup();
                prop_assert_eq!(sorted.len(), list.len());
            }

            for id in &event.waiting_list {
                prop_assert!(!event.selected_attendees.contains(id));
                prop_assert!(!event.cancelled_attendees.contains(id));
            }
            for id in &event.selected_attendees {
                prop_assert!(!event.cancelled_attendees.contains(id));
            }
            for id in &event.confirmed_attendees {
                prop_assert!(event.selected_attendees.contains(id));
            }
        }
    }
}
