//! # Waitlist Lottery Testing
//!
//! Testing utilities for the waitlist lottery engine.
//!
//! This crate provides:
//! - Deterministic Environment implementations (`FixedClock`, `SeededRandom`)
//! - An in-memory [`EventStore`](waitlist_lottery_core::event_store::EventStore)
//!   with optimistic concurrency and failure injection
//! - Recording and failing notification dispatchers
//! - A Given-When-Then [`ReducerTest`] harness
//! - proptest strategies for entrant ids
//!
//! ## Example
//!
//! ```
//! use waitlist_lottery_core::event::{EventId, EventRecord};
//! use waitlist_lottery_core::lottery::{LotteryAction, LotteryReducer, LotteryState};
//! use waitlist_lottery_testing::{ReducerTest, test_environment};
//!
//! let mut event = EventRecord::new(EventId::new("e1"), 1);
//! event.waiting_list = vec!["a".into(), "b".into()];
//!
//! ReducerTest::new(LotteryReducer::new())
//!     .with_env(test_environment(42))
//!     .given_state(LotteryState::new(event))
//!     .when_action(LotteryAction::RunLottery)
//!     .then_state(|state| {
//!         assert_eq!(state.event.selected_attendees.len(), 1);
//!         assert!(state.event.lottery_has_run);
//!     })
//!     .then_effects(|effects| assert_eq!(effects.len(), 3))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use waitlist_lottery_core::environment::{Clock, RandomSource};
use waitlist_lottery_core::lottery::LotteryEnvironment;

/// Given-When-Then harness for reducers
pub mod reducer_test;

/// In-memory event store
pub mod event_store;

/// Recording and failing notification dispatchers
pub mod dispatchers;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, RandomSource, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use std::sync::{Mutex, PoisonError};
    use waitlist_lottery_core::event::EntrantId;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use waitlist_lottery_testing::mocks::FixedClock;
    /// use waitlist_lottery_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Seeded random source: the same seed always yields the same draw
    ///
    /// # Example
    ///
    /// ```
    /// use waitlist_lottery_testing::mocks::SeededRandom;
    /// use waitlist_lottery_core::environment::RandomSource;
    /// use waitlist_lottery_core::event::EntrantId;
    ///
    /// let mut first: Vec<EntrantId> = ["a", "b", "c", "d"].map(EntrantId::from).to_vec();
    /// let mut second = first.clone();
    /// SeededRandom::new(7).shuffle(&mut first);
    /// SeededRandom::new(7).shuffle(&mut second);
    /// assert_eq!(first, second);
    /// ```
    #[derive(Debug)]
    pub struct SeededRandom {
        rng: Mutex<StdRng>,
    }

    impl SeededRandom {
        /// Create a random source from a seed
        #[must_use]
        pub fn new(seed: u64) -> Self {
            Self {
                rng: Mutex::new(StdRng::seed_from_u64(seed)),
            }
        }
    }

    impl RandomSource for SeededRandom {
        fn shuffle(&self, entrants: &mut [EntrantId]) {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            entrants.shuffle(&mut *rng);
        }
    }
}

/// proptest strategies for domain types
pub mod properties {
    use proptest::prelude::*;
    use waitlist_lottery_core::event::EntrantId;

    /// Up to `max` distinct entrant ids
    pub fn entrant_ids(max: usize) -> impl Strategy<Value = Vec<EntrantId>> {
        prop::collection::hash_set("[a-z]{1,6}", 0..=max)
            .prop_map(|names| names.into_iter().map(EntrantId::new).collect())
    }
}

/// Lottery environment with [`test_clock`] and a [`SeededRandom`]
#[must_use]
pub fn test_environment(seed: u64) -> LotteryEnvironment {
    LotteryEnvironment::new(Arc::new(test_clock()), Arc::new(SeededRandom::new(seed)))
}

/// Lottery environment pinned to `now`
#[must_use]
pub fn environment_at(now: DateTime<Utc>, seed: u64) -> LotteryEnvironment {
    LotteryEnvironment::new(Arc::new(FixedClock::new(now)), Arc::new(SeededRandom::new(seed)))
}

// Re-export commonly used items
pub use dispatchers::{FailingDispatcher, RecordingDispatcher};
pub use event_store::InMemoryEventStore;
pub use mocks::{FixedClock, SeededRandom, test_clock};
pub use reducer_test::{ReducerTest, assertions};
