//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use waitlist_lottery_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion = Box<dyn FnOnce(&[Effect])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// Actions given with [`ReducerTest::given_actions`] are applied first and their
/// effects discarded; assertions only see the state and effects produced by the
/// action under test.
///
/// # Example
///
/// ```ignore
/// use waitlist_lottery_testing::{ReducerTest, test_environment};
///
/// ReducerTest::new(LotteryReducer::new())
///     .with_env(test_environment(1))
///     .given_state(LotteryState::new(event))
///     .given_actions([LotteryAction::RunLottery])
///     .when_action(LotteryAction::DrawReplacements)
///     .then_state(|state| assert!(state.last_skip.is_some()))
///     .then_effects(assertions::assert_no_effects)
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    prior_actions: Vec<A>,
    action: Option<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            prior_actions: Vec::new(),
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Actions applied to the initial state before the action under test (Given)
    #[must_use]
    pub fn given_actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.prior_actions.extend(actions);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        for prior in self.prior_actions {
            let _ = self.reducer.reduce(&mut state, prior, &env);
        }

        // Execute reducer
        let effects = self.reducer.reduce(&mut state, action, &env);

        // Run state assertions
        for assertion in self.state_assertions {
            assertion(&state);
        }

        // Run effect assertions
        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use waitlist_lottery_core::effect::Effect;
    use waitlist_lottery_core::notification::OutcomeKind;

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects(effects: &[Effect]) {
        assert!(
            effects.is_empty() || matches!(effects, [Effect::None]),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count(effects: &[Effect], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that the first effect is a persistence intent and no other is
    ///
    /// # Panics
    ///
    /// Panics if the effects do not start with exactly one `Persist`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_persist_first(effects: &[Effect]) {
        assert!(
            matches!(effects.first(), Some(Effect::Persist(_))),
            "Expected a Persist effect first, found {effects:?}"
        );
        assert_eq!(
            effects.iter().filter(|e| e.as_persist().is_some()).count(),
            1,
            "Expected exactly one Persist effect"
        );
    }

    /// Count `Notify` effects with the given outcome
    #[must_use]
    pub fn count_notifications(effects: &[Effect], outcome: OutcomeKind) -> usize {
        effects
            .iter()
            .filter_map(Effect::as_notification)
            .filter(|request| request.outcome == outcome)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waitlist_lottery_core::event::{EntrantId, EventId, EventRecord, EventStatus};
    use waitlist_lottery_core::lottery::{LotteryAction, LotteryReducer, LotteryState, SkipReason};
    use waitlist_lottery_core::notification::OutcomeKind;

    fn event_with_waiting(max_attendees: u32, names: &[&str]) -> EventRecord {
        let mut event = EventRecord::new(EventId::new("e1"), max_attendees).with_title("Gala");
        event.waiting_list = names.iter().map(|n| EntrantId::new(*n)).collect();
        event
    }

    #[test]
    fn test_lottery_through_harness() {
        ReducerTest::new(LotteryReducer::new())
            .with_env(crate::test_environment(9))
            .given_state(LotteryState::new(event_with_waiting(2, &["a", "b", "c"])))
            .when_action(LotteryAction::RunLottery)
            .then_state(|state| {
                assert_eq!(state.event.status, EventStatus::LotteryCompleted);
                assert_eq!(state.event.selected_attendees.len(), 2);
            })
            .then_effects(|effects| {
                assertions::assert_persist_first(effects);
                assert_eq!(assertions::count_notifications(effects, OutcomeKind::SelectedFromWaitlist), 2);
                assert_eq!(
                    assertions::count_notifications(effects, OutcomeKind::NotSelectedFromWaitlist),
                    1
                );
            })
            .run();
    }

    #[test]
    fn test_given_actions_are_applied_first() {
        ReducerTest::new(LotteryReducer::new())
            .with_env(crate::test_environment(9))
            .given_state(LotteryState::new(event_with_waiting(1, &["a"])))
            .given_actions([LotteryAction::RunLottery])
            .when_action(LotteryAction::RunLottery)
            .then_state(|state| {
                assert_eq!(state.last_skip, Some(SkipReason::LotteryAlreadyCompleted));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_assertions_effects_count() {
        assertions::assert_effects_count(&[Effect::None], 1);
        assertions::assert_effects_count(&[], 0);
        assertions::assert_no_effects(&[Effect::None]);
    }
}
