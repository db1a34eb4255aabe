//! The client handle: one live subscription, one reducer store, one write path.
//!
//! [`TodoClient::init`] wires the pieces together:
//!
//! ```text
//!   Connector ──status──► pump task ──action──► Store(TodoListReducer)
//!                                                  │        ▲
//!                                   Effect::Serial │        │ feedback
//!                                                  ▼        │
//!                                               Dispatcher ─┘
//!                                                  │
//!                                                  ▼
//!                                             RemoteStore
//! ```
//!
//! After every reduced status and every mutation outcome the client
//! publishes a fresh [`TodoViewModel`] on a `watch` channel.

use crate::config::{ClientConfig, ConfigError};
use crate::connector::{Connector, Subscription, SubscriptionStatus};
use crate::dispatcher::Dispatcher;
use crate::metrics::{MetricsError, MetricsServer};
use crate::store::Store;
use crate::StoreError;
use shared_todos_core::batch::{DispatchOutcome, MutationError};
use shared_todos_core::environment::{IdGenerator, MonotonicClock, SystemClock, UuidGenerator};
use shared_todos_core::list::{
    Ticket, TodoListAction, TodoListEnvironment, TodoListReducer, TodoListState,
};
use shared_todos_core::remote::{Query, RemoteStore};
use shared_todos_core::todo::{Color, Deadline, Todo, TodoId, TodoPatch};
use shared_todos_core::view::TodoViewModel;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Store running the to-do list feature
pub type TodoStore = Store<TodoListState, TodoListAction, TodoListEnvironment, TodoListReducer>;

/// Broadcast capacity for mutation outcomes
const ACTION_CAPACITY: usize = 256;

/// Errors returned by [`TodoClient`] operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// The mutation was rejected or could not be delivered
    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// The store is shutting down, or the outcome did not arrive in time
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The metrics exporter could not be started
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Handle to a running shared to-do list.
///
/// Every intent method resolves once the store has accepted or refused the
/// write. Visible todos change only when the following snapshot arrives.
pub struct TodoClient {
    config: ClientConfig,
    store: TodoStore,
    view: Arc<watch::Sender<TodoViewModel>>,
    pump: Option<JoinHandle<()>>,
    tickets: AtomicU64,
    ids: Arc<dyn IdGenerator>,
    metrics: Option<MetricsServer>,
}

impl TodoClient {
    /// Start a client against `remote`.
    ///
    /// Opens the live subscription immediately; the view starts as loading.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if `config` is invalid, or
    /// [`ClientError::Metrics`] if a metrics address is configured and the
    /// exporter cannot start.
    pub async fn init(
        config: ClientConfig,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, ClientError> {
        Self::init_with_ids(config, remote, Arc::new(UuidGenerator)).await
    }

    /// Start a client using `ids` to name new todos.
    ///
    /// # Errors
    ///
    /// See [`init`](Self::init).
    #[tracing::instrument(skip_all, fields(app_id = %config.app_id))]
    pub async fn init_with_ids(
        config: ClientConfig,
        remote: Arc<dyn RemoteStore>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let metrics = match config.metrics_addr {
            Some(addr) => {
                let mut server = MetricsServer::new(addr);
                server.start()?;
                Some(server)
            },
            None => None,
        };

        let dispatcher = Dispatcher::new(Arc::clone(&remote));
        let environment = TodoListEnvironment::new(
            Arc::new(MonotonicClock::new(SystemClock)),
            Arc::new(dispatcher),
        );
        let store = Store::with_broadcast_capacity(
            TodoListState::new(),
            TodoListReducer::new(),
            environment,
            ACTION_CAPACITY,
        );

        let initial = store.state(TodoListState::view_model).await;
        let view = Arc::new(watch::channel(initial).0);

        let subscription = Connector::new(remote, config.retry_policy()).subscribe(Query::todos());
        let pump = tokio::spawn(pump(
            subscription,
            store.subscribe_actions(),
            store.clone(),
            Arc::clone(&view),
        ));

        tracing::info!("Client started");

        Ok(Self {
            config,
            store,
            view,
            pump: Some(pump),
            tickets: AtomicU64::new(1),
            ids,
            metrics,
        })
    }

    /// Configuration the client was started with
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Metrics exporter, when one was configured
    #[must_use]
    pub const fn metrics(&self) -> Option<&MetricsServer> {
        self.metrics.as_ref()
    }

    /// Latest view model
    #[must_use]
    pub fn view(&self) -> TodoViewModel {
        self.view.borrow().clone()
    }

    /// Observe view models as they are published
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<TodoViewModel> {
        self.view.subscribe()
    }

    /// Wait until the published view model satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if no matching model is published
    /// within `timeout`.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Result<TodoViewModel, ClientError>
    where
        F: FnMut(&TodoViewModel) -> bool,
    {
        let mut rx = self.view.subscribe();
        let result = tokio::time::timeout(timeout, async {
            rx.wait_for(predicate)
                .await
                .map(|model| TodoViewModel::clone(&model))
                .map_err(|_| StoreError::ChannelClosed)
        })
        .await;

        match result {
            Ok(model) => Ok(model?),
            Err(_) => Err(StoreError::Timeout.into()),
        }
    }

    /// Todos of the latest snapshot, in store order
    pub async fn todos(&self) -> Vec<Todo> {
        self.store.state(|s| s.todos.clone()).await
    }

    /// Create a todo. Returns its id once the store accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Mutation`] if the write was not applied.
    pub async fn add(
        &self,
        text: impl Into<String>,
        color: Option<Color>,
        deadline: Option<Deadline>,
    ) -> Result<TodoId, ClientError> {
        let id = self.ids.next_id();
        let text = text.into();
        let new_id = id.clone();
        self.submit(move |ticket| TodoListAction::Add {
            ticket,
            id: new_id,
            text,
            color,
            deadline,
        })
        .await?;
        Ok(id)
    }

    /// Delete a todo.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Mutation`] if the write was not applied.
    pub async fn delete(&self, id: TodoId) -> Result<DispatchOutcome, ClientError> {
        self.submit(|ticket| TodoListAction::Delete { ticket, id }).await
    }

    /// Flip a todo's completion flag, as currently shown.
    ///
    /// A todo missing from the current snapshot is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Mutation`] if the write was not applied.
    pub async fn toggle_done(&self, id: TodoId) -> Result<DispatchOutcome, ClientError> {
        self.submit(|ticket| TodoListAction::ToggleDone { ticket, id }).await
    }

    /// Change color and/or deadline of a todo.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Mutation`] if the write was not applied.
    pub async fn update(&self, id: TodoId, patch: TodoPatch) -> Result<DispatchOutcome, ClientError> {
        self.submit(|ticket| TodoListAction::Update { ticket, id, patch })
            .await
    }

    /// Delete every completed todo of the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Mutation`] if the write was not applied.
    pub async fn delete_completed(&self) -> Result<DispatchOutcome, ClientError> {
        self.submit(|ticket| TodoListAction::DeleteCompleted { ticket })
            .await
    }

    /// Set every todo of the current snapshot to the toggle-all target.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Mutation`] if the write was not applied.
    pub async fn toggle_all(&self) -> Result<DispatchOutcome, ClientError> {
        self.submit(|ticket| TodoListAction::ToggleAll { ticket })
            .await
    }

    /// Clear the last mutation error from the view.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the client is stopping.
    pub async fn dismiss_error(&self) -> Result<(), ClientError> {
        self.store.send(TodoListAction::DismissError).await?;
        publish(&self.store, &self.view).await;
        Ok(())
    }

    /// Stop the subscription, then wait for in-flight writes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if writes are still running
    /// after the configured grace period.
    pub async fn shutdown(mut self) -> Result<(), ClientError> {
        tracing::info!("Shutting down client");
        if let Some(pump) = self.pump.take() {
            pump.abort();
            let _ = pump.await;
        }
        self.store.shutdown(self.config.shutdown_timeout).await?;
        Ok(())
    }

    async fn submit<F>(&self, intent: F) -> Result<DispatchOutcome, ClientError>
    where
        F: FnOnce(Ticket) -> TodoListAction,
    {
        let ticket = Ticket::new(self.tickets.fetch_add(1, Ordering::Relaxed));
        let action = intent(ticket);
        tracing::debug!(%ticket, action = action.name(), "Submitting intent");

        let result = self
            .store
            .send_and_wait_for(
                action,
                |feedback| {
                    feedback.ticket() == Some(ticket) && feedback.mutation_outcome().is_some()
                },
                self.config.mutation_timeout,
            )
            .await;
        publish(&self.store, &self.view).await;

        match result?.mutation_outcome() {
            Some(outcome) => Ok(outcome?),
            None => Err(StoreError::ChannelClosed.into()),
        }
    }
}

impl Drop for TodoClient {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for TodoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoClient")
            .field("app_id", &self.config.app_id)
            .field("running", &self.pump.is_some())
            .finish_non_exhaustive()
    }
}

/// Publish the current view model if it changed.
///
/// Runs under the state read lock so a model is never replaced by an
/// older one.
async fn publish(store: &TodoStore, view: &watch::Sender<TodoViewModel>) {
    store
        .state(|state| {
            let model = state.view_model();
            view.send_if_modified(|current| {
                if *current == model {
                    false
                } else {
                    *current = model;
                    true
                }
            });
        })
        .await;
}

/// Feed subscription statuses into the store and republish the view after
/// every status and every mutation outcome.
async fn pump(
    mut subscription: Subscription,
    mut outcomes: broadcast::Receiver<TodoListAction>,
    store: TodoStore,
    view: Arc<watch::Sender<TodoViewModel>>,
) {
    loop {
        tokio::select! {
            status = subscription.changed() => {
                let Some(status) = status else {
                    tracing::warn!("Subscription stopped");
                    break;
                };
                let action = match status {
                    // Only the initial status; reconnects stay in `Error` until `Ready`
                    SubscriptionStatus::Loading => continue,
                    SubscriptionStatus::Ready(todos) => TodoListAction::SnapshotReceived { todos },
                    SubscriptionStatus::Error(message) => {
                        TodoListAction::SubscriptionFailed { message }
                    },
                };
                if store.send(action).await.is_err() {
                    break;
                }
            },
            outcome = outcomes.recv() => match outcome {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {},
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
        publish(&store, &view).await;
    }
}
