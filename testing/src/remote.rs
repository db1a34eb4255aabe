//! In-memory reactive store.
//!
//! [`InMemoryRemote`] behaves like the external store as seen by clients:
//! subscriptions receive the full collection immediately and again after
//! every committed batch, and batches are validated and applied atomically.
//! Tests can inject faults on both paths.

use futures::StreamExt;
use shared_todos_core::remote::{
    Batch, Operation, Query, RemoteError, RemoteStore, SnapshotStream, TODOS,
};
use shared_todos_core::todo::Todo;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct Shared {
    todos: Vec<Todo>,
    /// Bumped by [`InMemoryRemote::break_streams`]; streams opened under an
    /// older epoch fail with `fault`.
    fault_epoch: u64,
    fault: RemoteError,
}

#[derive(Debug, Default)]
struct Faults {
    subscribe: VecDeque<RemoteError>,
    transact: VecDeque<RemoteError>,
    latency: Option<Duration>,
}

/// Decrements the active subscription count when a stream is dropped.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reactive in-memory store with fault injection.
///
/// Cloning yields another handle to the same store.
///
/// Validation rules for a batch (any failure rejects the whole batch and
/// nothing is applied):
/// - `Create` of an id that already exists
/// - `Update` or `Delete` of an id that does not exist
#[derive(Clone)]
pub struct InMemoryRemote {
    state: Arc<watch::Sender<Shared>>,
    faults: Arc<Mutex<Faults>>,
    committed: Arc<Mutex<Vec<Batch>>>,
    active: Arc<AtomicUsize>,
    subscribe_calls: Arc<AtomicUsize>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRemote")
            .field("todos", &self.state.borrow().todos.len())
            .field("active_subscriptions", &self.active_subscriptions())
            .finish_non_exhaustive()
    }
}

impl InMemoryRemote {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(Shared {
            todos: Vec::new(),
            fault_epoch: 0,
            fault: RemoteError::Closed,
        });
        Self {
            state: Arc::new(state),
            faults: Arc::new(Mutex::new(Faults::default())),
            committed: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            subscribe_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a store holding `todos`
    #[must_use]
    pub fn with_todos(todos: Vec<Todo>) -> Self {
        let remote = Self::new();
        remote.seed(todos);
        remote
    }

    /// Replaces the whole collection, notifying subscribers
    pub fn seed(&self, todos: Vec<Todo>) {
        self.state.send_modify(|shared| shared.todos = todos);
    }

    /// Current collection, in store order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Todo> {
        self.state.borrow().todos.clone()
    }

    /// Batches applied so far, in commit order
    #[must_use]
    pub fn transactions(&self) -> Vec<Batch> {
        lock(&self.committed).clone()
    }

    /// The next `subscribe` call fails with `error`
    pub fn fail_next_subscribe(&self, error: RemoteError) {
        lock(&self.faults).subscribe.push_back(error);
    }

    /// The next `transact` call fails with `error` and applies nothing
    pub fn reject_next_transact(&self, error: RemoteError) {
        lock(&self.faults).transact.push_back(error);
    }

    /// Delays every `transact` call
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.faults).latency = Some(latency);
    }

    /// Every open subscription stream yields `error` and ends
    pub fn break_streams(&self, error: RemoteError) {
        self.state.send_modify(|shared| {
            shared.fault_epoch += 1;
            shared.fault = error;
        });
    }

    /// Number of subscription streams not yet dropped
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of `subscribe` calls, failed ones included
    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    fn open_stream(&self) -> SnapshotStream {
        let mut rx = self.state.subscribe();
        let epoch = rx.borrow_and_update().fault_epoch;
        let guard = ActiveGuard::new(Arc::clone(&self.active));

        let stream = async_stream::stream! {
            let _guard = guard;
            loop {
                let next = {
                    let shared = rx.borrow_and_update();
                    if shared.fault_epoch == epoch {
                        Ok(shared.todos.clone())
                    } else {
                        Err(shared.fault.clone())
                    }
                };
                let failed = next.is_err();
                yield next;
                if failed || rx.changed().await.is_err() {
                    break;
                }
            }
        };
        stream.boxed()
    }
}

/// Applies `batch` to a copy of `todos`.
fn apply_batch(todos: &[Todo], batch: &Batch) -> Result<Vec<Todo>, RemoteError> {
    let mut next = todos.to_vec();
    for operation in batch.operations() {
        match operation {
            Operation::Create { todo } => {
                if next.iter().any(|existing| existing.id == todo.id) {
                    return Err(RemoteError::Rejected(format!(
                        "todo {} already exists",
                        todo.id
                    )));
                }
                next.push(todo.clone());
            },
            Operation::Update { id, patch } => {
                let Some(existing) = next.iter_mut().find(|existing| &existing.id == id) else {
                    return Err(RemoteError::Rejected(format!("todo {id} not found")));
                };
                existing.apply(patch);
            },
            Operation::Delete { id } => {
                let Some(index) = next.iter().position(|existing| &existing.id == id) else {
                    return Err(RemoteError::Rejected(format!("todo {id} not found")));
                };
                next.remove(index);
            },
        }
    }
    Ok(next)
}

impl RemoteStore for InMemoryRemote {
    fn subscribe(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream, RemoteError>> + Send + '_>> {
        Box::pin(async move {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

            if query.collection != TODOS {
                return Err(RemoteError::Rejected(format!(
                    "unknown collection {}",
                    query.collection
                )));
            }
            let fault = lock(&self.faults).subscribe.pop_front();
            if let Some(error) = fault {
                return Err(error);
            }
            Ok(self.open_stream())
        })
    }

    fn transact(
        &self,
        batch: Batch,
    ) -> Pin<Box<dyn Future<Output = Result<(), RemoteError>> + Send + '_>> {
        Box::pin(async move {
            let (fault, latency) = {
                let mut faults = lock(&self.faults);
                (faults.transact.pop_front(), faults.latency)
            };
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if let Some(error) = fault {
                return Err(error);
            }
            if batch.is_empty() {
                return Ok(());
            }

            let mut outcome = Ok(());
            self.state.send_if_modified(|shared| match apply_batch(&shared.todos, &batch) {
                Ok(next) => {
                    shared.todos = next;
                    true
                },
                Err(error) => {
                    outcome = Err(error);
                    false
                },
            });
            if outcome.is_ok() {
                lock(&self.committed).push(batch);
            }
            outcome
        })
    }
}
