//! # Shared Todos Runtime
//!
//! Runtime for Shared Todos: the reducer [`Store`], the live-subscription
//! [`connector`], the mutation [`dispatcher`] and the [`client`] handle that
//! wires them together.
//!
//! ## Core Components
//!
//! - **Store**: manages state, runs the reducer and executes effects
//! - **Connector**: keeps one live subscription open, retrying with backoff
//! - **Dispatcher**: sends intent batches to the remote store, in order
//! - **`TodoClient`**: `init(config, remote)` / `shutdown()` lifecycle
//!
//! ## Example
//!
//! ```ignore
//! use shared_todos_runtime::{ClientConfig, TodoClient};
//!
//! let client = TodoClient::init(ClientConfig::from_env()?, remote).await?;
//! client.add("Buy milk", None, None).await?;
//!
//! let model = client.view();
//! println!("{} remaining", model.remaining_count);
//!
//! client.shutdown().await?;
//! ```

use shared_todos_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Backoff policy for live subscriptions
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// Environment-driven client configuration
pub mod config;

/// Live subscription with automatic reconnection
pub mod connector;

/// Ordered delivery of mutation batches
pub mod dispatcher;

/// Client handle tying the subscription, the store and the dispatcher together
pub mod client;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects of one
/// action to complete.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (_, rx) = watch::channel(());
        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects of this action still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all
    /// effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Internal: completion tracking for the effects of one action
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            self.notifier.send_replace(());
        }
    }
}

/// Internal: RAII guard that decrements effect counters on drop
///
/// Ensures counters are always decremented, even if the effect panics.
struct EffectGuard {
    tracking: EffectTracking,
    pending: Arc<AtomicUsize>,
}

impl EffectGuard {
    fn new(tracking: EffectTracking, pending: Arc<AtomicUsize>) -> Self {
        tracking.increment();
        pending.fetch_add(1, Ordering::SeqCst);
        Self { tracking, pending }
    }
}

impl Drop for EffectGuard {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.tracking.decrement();
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicUsize, Duration, Effect, EffectGuard, EffectHandle,
        EffectTracking, Ordering, Reducer, RwLock, StoreError,
    };
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::OnceLock;
    use tokio::sync::{broadcast, mpsc};

    /// Unit of work on the serial effect queue
    type SerialJob = Pin<Box<dyn Future<Output = ()> + Send>>;

    /// Default capacity of the action broadcast channel
    pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// `Effect::Future` effects run concurrently in spawned tasks.
    /// `Effect::Serial` effects run one at a time, in the order the reducer
    /// emitted them, on a queue shared by all clones of the store.
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Actions produced by effects, broadcast after they were reduced.
        action_broadcast: broadcast::Sender<A>,
        serial: Arc<OnceLock<mpsc::UnboundedSender<SerialJob>>>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Sync + Clone + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(
                initial_state,
                reducer,
                environment,
                DEFAULT_BROADCAST_CAPACITY,
            )
        }

        /// Create a new Store with custom action broadcast capacity
        ///
        /// Increase the capacity if observers frequently lag.
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
                serial: Arc::new(OnceLock::new()),
            }
        }

        /// Number of effects still running or queued
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// This method:
        /// 1. Sets the shutdown flag (rejecting new actions)
        /// 2. Waits for pending effects to complete (with timeout)
        ///
        /// Feedback from effects still running is reduced normally.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timed out");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Returns true once shutdown has been initiated
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects
        ///
        /// `send()` returns after starting effect execution, not completion.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.is_shutting_down() {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }
            Ok(self.dispatch(action).await)
        }

        /// Send an action and wait for a matching action produced by an effect
        ///
        /// Subscribes to the action broadcast before sending, so the result
        /// cannot be missed. When the matching action is returned, it has
        /// already been reduced.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            // Subscribe BEFORE sending to avoid race condition
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to actions produced by effects
        ///
        /// Each action is broadcast after it has been reduced. Actions sent
        /// directly through [`send`](Self::send) are not broadcast.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let count = store.state(|s| s.todos.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Reduce an action and start its effects.
        ///
        /// Effects are started while the write lock is held so that serial
        /// effects are queued in reduce order.
        async fn dispatch(&self, action: A) -> EffectHandle {
            metrics::counter!("store.actions.total").increment(1);
            let (handle, tracking) = EffectHandle::new();

            let mut state = self.state.write().await;

            let effects = {
                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!(effects = effects.len(), "Reducer completed");
                effects
            };

            for effect in effects {
                self.execute_effect(effect, &tracking);
            }
            drop(state);

            handle
        }

        /// Feed an action produced by an effect back into the store, then
        /// broadcast it.
        async fn feed_back(&self, action: A) {
            let _ = self.dispatch(action.clone()).await;
            let _ = self.action_broadcast.send(action);
        }

        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let guard = EffectGuard::new(tracking.clone(), Arc::clone(&self.pending_effects));
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = guard;
                        if let Some(action) = fut.await {
                            store.feed_back(action).await;
                        }
                    });
                },
                Effect::Serial(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "serial").increment(1);
                    let guard = EffectGuard::new(tracking.clone(), Arc::clone(&self.pending_effects));
                    let store = self.clone();

                    let job: SerialJob = Box::pin(async move {
                        let _guard = guard;
                        if let Some(action) = fut.await {
                            store.feed_back(action).await;
                        }
                    });

                    if let Err(mpsc::error::SendError(job)) = self.serial_queue().send(job) {
                        // Worker gone (runtime shutting down); run detached
                        tracing::warn!("Serial effect queue closed, running effect detached");
                        tokio::spawn(job);
                    }
                },
            }
        }

        /// The serial queue, starting its worker on first use.
        fn serial_queue(&self) -> &mpsc::UnboundedSender<SerialJob> {
            self.serial.get_or_init(|| {
                let (tx, mut rx) = mpsc::unbounded_channel::<SerialJob>();
                tokio::spawn(async move {
                    while let Some(job) = rx.recv().await {
                        job.await;
                    }
                    tracing::trace!("Serial effect queue drained and closed");
                });
                tx
            })
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
                serial: Arc::clone(&self.serial),
            }
        }
    }
}

// Re-export for convenience
pub use client::{ClientError, TodoClient};
pub use config::{ClientConfig, ConfigError};
pub use connector::{Connector, Subscription, SubscriptionError, SubscriptionStatus};
pub use dispatcher::Dispatcher;
pub use retry::RetryPolicy;
pub use shared_todos_core::batch::{DispatchOutcome, MutationError};
pub use store::Store;
