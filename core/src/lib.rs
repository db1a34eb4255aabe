//! # Shared Todos Core
//!
//! Core types for a to-do list kept consistent across clients by a shared,
//! reactive remote store.
//!
//! ## Core Concepts
//!
//! - **Todo**: the single entity of the shared collection ([`todo`])
//! - **Remote store**: external source of truth, consumed through live
//!   snapshot subscriptions and atomic batches ([`remote`])
//! - **Batches**: pure translation of user intents into writes ([`batch`])
//! - **Views**: pure derivation of grouped lists and counts ([`view`])
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)` ([`list`])
//!
//! ## Architecture Principles
//!
//! - The remote snapshot is the only source of visible state
//! - No optimistic local writes
//! - Explicit effects, dependencies injected via the environment
//!
//! ## Example
//!
//! ```
//! use shared_todos_core::todo::{Todo, TodoId};
//! use shared_todos_core::view::TodoViews;
//!
//! let snapshot = vec![Todo::new(TodoId::new(), "Buy milk", 0)];
//! let views = TodoViews::build(&snapshot);
//! assert_eq!(views.remaining_count, 1);
//! assert!(views.toggle_all_target);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod batch;
pub mod list;
pub mod remote;
pub mod todo;
pub mod view;

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
        /// Updates state in place and returns effect descriptions for the
        /// runtime to execute. Must not perform I/O itself.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values returned by reducers and executed by the runtime.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Boxed future producing an optional feedback action
    pub type EffectFuture<Action> = Pin<Box<dyn Future<Output = Option<Action>> + Send>>;

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation, run concurrently with other effects
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(EffectFuture<Action>),

        /// Async computation queued behind every previously emitted
        /// `Serial` effect of the same store
        ///
        /// Used for writes that must reach the remote store in the order
        /// their actions were reduced.
        Serial(EffectFuture<Action>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Serial(_) => write!(f, "Effect::Serial(<future>)"),
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies (time, identity, the write path to the remote
/// store) are abstracted behind traits and injected via the Environment.
pub mod environment {
    use crate::batch::{DispatchOutcome, Intent, MutationError};
    use crate::remote::Batch;
    use crate::todo::TodoId;
    use chrono::{DateTime, Utc};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current time in milliseconds since the Unix epoch
        fn now_millis(&self) -> i64 {
            self.now().timestamp_millis()
        }
    }

    /// Wall clock
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Clock that never goes backwards.
    ///
    /// Creation timestamps must be non-decreasing across successive creates
    /// even if the wall clock is adjusted.
    #[derive(Debug)]
    pub struct MonotonicClock<C> {
        inner: C,
        last_millis: AtomicI64,
    }

    impl<C: Clock> MonotonicClock<C> {
        /// Wraps a clock
        #[must_use]
        pub const fn new(inner: C) -> Self {
            Self {
                inner,
                last_millis: AtomicI64::new(i64::MIN),
            }
        }
    }

    impl<C: Clock> Clock for MonotonicClock<C> {
        fn now(&self) -> DateTime<Utc> {
            let now = self.inner.now();
            let millis = now.timestamp_millis();
            let previous = self.last_millis.fetch_max(millis, Ordering::SeqCst);
            if previous > millis {
                DateTime::from_timestamp_millis(previous).unwrap_or(now)
            } else {
                now
            }
        }
    }

    /// Source of client-side record identifiers
    pub trait IdGenerator: Send + Sync {
        /// Generate a fresh, collision-resistant id
        fn next_id(&self) -> TodoId;
    }

    /// Random UUID v4 identifiers
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn next_id(&self) -> TodoId {
            TodoId::new()
        }
    }

    /// Write path to the remote store.
    ///
    /// Implementations deliver batches from one client in the order they
    /// are submitted and skip empty batches.
    pub trait Transactor: Send + Sync {
        /// Submit the batch produced by `intent`.
        ///
        /// # Errors
        ///
        /// Returns [`MutationError`] if the batch is rejected or cannot be delivered.
        fn transact(
            &self,
            intent: Intent,
            batch: Batch,
        ) -> Pin<Box<dyn Future<Output = Result<DispatchOutcome, MutationError>> + Send + '_>>;
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, MonotonicClock};
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    struct ScriptedClock(Mutex<Vec<i64>>);

    impl Clock for ScriptedClock {
        fn now(&self) -> DateTime<Utc> {
            let millis = self.0.lock().unwrap().remove(0);
            DateTime::from_timestamp_millis(millis).unwrap()
        }
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new(ScriptedClock(Mutex::new(vec![100, 50, 200])));

        assert_eq!(clock.now_millis(), 100);
        assert_eq!(clock.now_millis(), 100);
        assert_eq!(clock.now_millis(), 200);
    }
}
