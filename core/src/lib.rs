//! # Waitlist Lottery Core
//!
//! Domain model and allocation engine for capacity-constrained events.
//!
//! This crate decides, for one event, which registrants hold a slot, which are
//! waiting, which were dropped, and how replacements are drawn when slots free up.
//! It performs no I/O: every persistence write and every notification is returned
//! as an [`Effect`](effect::Effect) for the caller to execute.
//!
//! ## Core Concepts
//!
//! - **EventRecord**: the persisted document holding capacity, status, deadlines and
//!   the four rosters (waiting, selected, confirmed, cancelled)
//! - **Roster**: a per-operation capability surface over one record's rosters
//! - **LotteryEngine**: random admission, deterministic backfill and deadline checks
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: persistence and notification intents (descriptions, not execution)
//!
//! ## Example
//!
//! ```
//! use waitlist_lottery_core::environment::ThreadRandom;
//! use waitlist_lottery_core::event::{EntrantId, EventId, EventRecord};
//! use waitlist_lottery_core::lottery::LotteryEngine;
//! use waitlist_lottery_core::roster::Roster;
//!
//! let mut event = EventRecord::new(EventId::new("spring-gala"), 2);
//! let mut roster = Roster::new(&mut event);
//! for id in ["a", "b", "c"] {
//!     roster.add_to_waiting(&EntrantId::new(id));
//! }
//!
//! let draw = LotteryEngine::new().run_lottery(&mut roster, &ThreadRandom);
//! assert_eq!(draw.selected.len(), 2);
//! assert_eq!(draw.not_selected.len(), 1);
//! assert!(event.lottery_has_run);
//! ```

use std::future::Future;
use std::pin::Pin;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Event records, identifiers and the lifecycle state machine
pub mod event;

/// Roster mutation primitives enforcing membership invariants
pub mod roster;

/// Lottery engine, actions and reducer
pub mod lottery;

/// Notification requests and the dispatcher collaborator
pub mod notification;

/// Event store collaborator with optimistic concurrency
pub mod event_store;

/// Boxed future returned by collaborator traits.
///
/// Collaborators return `Pin<Box<dyn Future>>` instead of using `async fn` so
/// they stay usable as trait objects (`Arc<dyn EventStore>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Checks the action's preconditions
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed by the caller
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution): the engine never writes to the store or
/// sends a notification itself.
pub mod effect {
    use crate::event::EventRecord;
    use crate::notification::NotificationRequest;

    /// Effect type - describes a side effect to be executed
    ///
    /// A reducer that accepts an action returns exactly one [`Effect::Persist`]
    /// followed by zero or more [`Effect::Notify`]. A skipped action returns no
    /// effects at all.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Effect {
        /// No-op effect
        None,

        /// Replace the stored document with this snapshot.
        ///
        /// The snapshot carries the version it was loaded at; the store rejects
        /// the write if another writer got there first.
        Persist(Box<EventRecord>),

        /// Ask the dispatcher to tell one entrant about an outcome
        Notify(NotificationRequest),
    }

    impl Effect {
        /// Returns the notification request if this is a `Notify` effect
        #[must_use]
        pub const fn as_notification(&self) -> Option<&NotificationRequest> {
            match self {
                Self::Notify(request) => Some(request),
                _ => None,
            }
        }

        /// Returns the snapshot if this is a `Persist` effect
        #[must_use]
        pub fn as_persist(&self) -> Option<&EventRecord> {
            match self {
                Self::Persist(record) => Some(record),
                _ => None,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All nondeterminism (time and randomness) is abstracted behind traits and
/// injected via the Environment parameter.
pub mod environment {
    use crate::event::EntrantId;
    use chrono::{DateTime, Utc};
    use rand::seq::SliceRandom;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`]
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of the uniform permutation used by the lottery draw.
    ///
    /// Implementations must produce every permutation with equal probability
    /// (Fisher–Yates or equivalent). Inject a seeded source to make draws
    /// reproducible in tests and audits.
    pub trait RandomSource: Send + Sync {
        /// Shuffle the entrants in place
        fn shuffle(&self, entrants: &mut [EntrantId]);
    }

    /// Random source backed by the thread-local RNG
    #[derive(Clone, Copy, Debug, Default)]
    pub struct ThreadRandom;

    impl RandomSource for ThreadRandom {
        fn shuffle(&self, entrants: &mut [EntrantId]) {
            entrants.shuffle(&mut rand::thread_rng());
        }
    }
}

pub use effect::Effect;
pub use environment::{Clock, RandomSource, SystemClock, ThreadRandom};
pub use event::{EntrantId, EventId, EventRecord, EventStatus, Location, OrganizerId};
pub use event_store::{EventFilter, EventStore, EventStoreError};
pub use lottery::{
    Draw, LotteryAction, LotteryEngine, LotteryEnvironment, LotteryReducer, LotteryState,
    SkipReason,
};
pub use notification::{NotificationDispatcher, NotificationError, NotificationRequest, OutcomeKind};
pub use reducer::Reducer;
pub use roster::Roster;
