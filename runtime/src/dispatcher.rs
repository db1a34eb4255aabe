//! Delivery of mutation batches to the remote store.
//!
//! The [`Dispatcher`] is the single write path of a client. It delivers one
//! batch at a time, so batches reach the store in the order they were
//! submitted. A batch is never retried: a rejection or transport failure is
//! reported to the caller and nothing from the batch is applied.
//!
//! Local state is never touched here. The effect of a committed batch
//! becomes visible through the next snapshot of the live subscription.

use crate::metrics::MutationMetrics;
use shared_todos_core::batch::{DispatchOutcome, Intent, MutationError, TodoBatches};
use shared_todos_core::environment::{Clock, IdGenerator, Transactor};
use shared_todos_core::remote::{Batch, RemoteStore};
use shared_todos_core::todo::{Color, Deadline, Todo, TodoId, TodoPatch};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Ordered, non-retrying write path to a [`RemoteStore`].
#[derive(Clone)]
pub struct Dispatcher {
    remote: Arc<dyn RemoteStore>,
    /// Held for the whole round trip of a batch
    ordering: Arc<Mutex<()>>,
}

impl Dispatcher {
    /// Create a dispatcher writing to `remote`
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            ordering: Arc::new(Mutex::new(())),
        }
    }

    /// Deliver the batch produced by `intent`.
    ///
    /// Empty batches are not sent and report [`DispatchOutcome::Skipped`].
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Rejected`] if the store refused the batch, or
    /// [`MutationError::Transport`] if it could not be delivered.
    #[tracing::instrument(skip(self, batch), fields(operations = batch.len()))]
    pub async fn dispatch(
        &self,
        intent: Intent,
        batch: Batch,
    ) -> Result<DispatchOutcome, MutationError> {
        if batch.is_empty() {
            tracing::debug!("Nothing to write, skipping");
            return Ok(DispatchOutcome::Skipped);
        }

        let operations = batch.len();
        let _ordered = self.ordering.lock().await;
        let start = Instant::now();

        match self.remote.transact(batch).await {
            Ok(()) => {
                MutationMetrics::record_dispatched(intent, operations, start.elapsed());
                tracing::debug!("Batch committed");
                Ok(DispatchOutcome::Committed { operations })
            },
            Err(error) => {
                MutationMetrics::record_rejected(intent);
                tracing::warn!(%error, "Batch not applied");
                Err(MutationError::from(error))
            },
        }
    }

    /// Create a todo with a fresh id and a non-decreasing creation time.
    ///
    /// Returns the id of the new todo once the store accepted it.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn add(
        &self,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
        text: impl Into<String>,
        color: Option<Color>,
        deadline: Option<Deadline>,
    ) -> Result<TodoId, MutationError> {
        let id = ids.next_id();
        let batch = TodoBatches::add(id.clone(), text, color, deadline, clock.now_millis());
        self.dispatch(Intent::Add, batch).await?;
        Ok(id)
    }

    /// Delete one todo.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn delete(&self, id: TodoId) -> Result<DispatchOutcome, MutationError> {
        self.dispatch(Intent::Delete, TodoBatches::delete(id)).await
    }

    /// Flip the completion flag of `todo` as observed.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn toggle_done(&self, todo: &Todo) -> Result<DispatchOutcome, MutationError> {
        self.dispatch(Intent::ToggleDone, TodoBatches::toggle_done(todo))
            .await
    }

    /// Change color and/or deadline of one todo.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn update(
        &self,
        id: TodoId,
        patch: TodoPatch,
    ) -> Result<DispatchOutcome, MutationError> {
        if patch.is_empty() {
            return Ok(DispatchOutcome::Skipped);
        }
        self.dispatch(Intent::Update, TodoBatches::update(id, patch))
            .await
    }

    /// Delete every completed todo of `todos` in one batch.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn delete_completed(&self, todos: &[Todo]) -> Result<DispatchOutcome, MutationError> {
        self.dispatch(Intent::DeleteCompleted, TodoBatches::delete_completed(todos))
            .await
    }

    /// Set every todo of `todos` to the toggle-all target in one batch.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn toggle_all(&self, todos: &[Todo]) -> Result<DispatchOutcome, MutationError> {
        self.dispatch(Intent::ToggleAll, TodoBatches::toggle_all(todos))
            .await
    }
}

impl Transactor for Dispatcher {
    fn transact(
        &self,
        intent: Intent,
        batch: Batch,
    ) -> Pin<Box<dyn Future<Output = Result<DispatchOutcome, MutationError>> + Send + '_>> {
        Box::pin(self.dispatch(intent, batch))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
