//! # Shared Todos Testing
//!
//! Testing utilities and helpers for Shared Todos.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - [`InMemoryRemote`], a reactive store with fault injection
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use shared_todos_testing::{InMemoryRemote, test_clock};
//!
//! #[tokio::test]
//! async fn two_clients_converge() {
//!     let remote = Arc::new(InMemoryRemote::new());
//!     let alice = TodoClient::init(config(), remote.clone()).await?;
//!     let bob = TodoClient::init(config(), remote.clone()).await?;
//!
//!     alice.add("Buy milk", None, None).await?;
//!     bob.wait_for(|model| model.remaining_count == 1).await;
//! }
//! ```

use chrono::{DateTime, Utc};
use shared_todos_core::environment::{Clock, IdGenerator, Transactor};

pub mod properties;
pub mod remote;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Transactor, Utc};
    use shared_todos_core::batch::{DispatchOutcome, Intent, MutationError};
    use shared_todos_core::remote::Batch;
    use shared_todos_core::todo::TodoId;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use uuid::Uuid;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use shared_todos_testing::mocks::FixedClock;
    /// use shared_todos_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
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
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp_millis(TEST_EPOCH_MILLIS).unwrap_or_default())
    }

    /// 2025-01-01 00:00:00 UTC in milliseconds
    pub const TEST_EPOCH_MILLIS: i64 = 1_735_689_600_000;

    /// Clock advancing by a fixed step on every reading.
    ///
    /// Can also be moved backwards to simulate wall-clock adjustments.
    #[derive(Debug)]
    pub struct SteppingClock {
        next_millis: AtomicI64,
        step_millis: i64,
    }

    impl SteppingClock {
        /// Clock starting at `start_millis`, advancing `step_millis` per reading
        #[must_use]
        pub const fn new(start_millis: i64, step_millis: i64) -> Self {
            Self {
                next_millis: AtomicI64::new(start_millis),
                step_millis,
            }
        }

        /// Sets the next reading
        pub fn set(&self, millis: i64) {
            self.next_millis.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let millis = self.next_millis.fetch_add(self.step_millis, Ordering::SeqCst);
            DateTime::from_timestamp_millis(millis).unwrap_or_default()
        }
    }

    /// Predictable ids: `00000000-0000-0000-0000-000000000001`, `...02`, ...
    #[derive(Debug, Default)]
    pub struct SequentialIds {
        next: AtomicU64,
    }

    impl SequentialIds {
        /// Creates a generator starting at 1
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }

        /// The id produced by the `n`th call (1-based)
        #[must_use]
        pub fn nth(n: u64) -> TodoId {
            TodoId::from_uuid(Uuid::from_u128(u128::from(n)))
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> TodoId {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            Self::nth(n)
        }
    }

    /// Transactor that records every submitted batch.
    ///
    /// Commits everything unless a failure was queued with
    /// [`fail_next`](Self::fail_next). Empty batches are skipped.
    #[derive(Debug, Default)]
    pub struct RecordingTransactor {
        calls: Mutex<Vec<(Intent, Batch)>>,
        failures: Mutex<VecDeque<MutationError>>,
    }

    impl RecordingTransactor {
        /// Creates a transactor that accepts everything
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a failure for the next non-empty batch
        pub fn fail_next(&self, error: MutationError) {
            lock(&self.failures).push_back(error);
        }

        /// Every call received, in order
        #[must_use]
        pub fn calls(&self) -> Vec<(Intent, Batch)> {
            lock(&self.calls).clone()
        }

        /// Batches received, in order
        #[must_use]
        pub fn batches(&self) -> Vec<Batch> {
            lock(&self.calls)
                .iter()
                .map(|(_, batch)| batch.clone())
                .collect()
        }
    }

    impl Transactor for RecordingTransactor {
        fn transact(
            &self,
            intent: Intent,
            batch: Batch,
        ) -> Pin<Box<dyn Future<Output = Result<DispatchOutcome, MutationError>> + Send + '_>>
        {
            Box::pin(async move {
                let operations = batch.len();
                lock(&self.calls).push((intent, batch));
                if operations == 0 {
                    return Ok(DispatchOutcome::Skipped);
                }
                match lock(&self.failures).pop_front() {
                    Some(error) => Err(error),
                    None => Ok(DispatchOutcome::Committed { operations }),
                }
            })
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use shared_todos_core::effect::Effect;
    use shared_todos_core::todo::{Todo, TodoId};

    /// Runs every effect to completion, in order, and returns the feedback
    /// actions they produced.
    pub async fn collect_feedback<A>(effects: impl IntoIterator<Item = Effect<A>>) -> Vec<A> {
        let mut actions = Vec::new();
        for effect in effects {
            match effect {
                Effect::None => {},
                Effect::Future(future) | Effect::Serial(future) => {
                    if let Some(action) = future.await {
                        actions.push(action);
                    }
                },
            }
        }
        actions
    }

    /// An open todo with a random id
    #[must_use]
    pub fn todo(text: &str) -> Todo {
        Todo::new(TodoId::new(), text, super::mocks::TEST_EPOCH_MILLIS)
    }

    /// A completed todo with a random id
    #[must_use]
    pub fn done_todo(text: &str) -> Todo {
        todo(text).with_done(true)
    }

    /// Installs a test-friendly tracing subscriber (idempotent)
    ///
    /// Honors `RUST_LOG`; output goes through the test harness capture.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::{collect_feedback, init_test_tracing};
pub use mocks::{FixedClock, RecordingTransactor, SequentialIds, SteppingClock, test_clock};
pub use reducer_test::ReducerTest;
pub use remote::InMemoryRemote;
