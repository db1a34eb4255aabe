//! Live subscription to the shared collection.
//!
//! A [`Connector`] opens one subscription per [`Subscription`] handle and
//! keeps it alive: when the stream fails or ends, it publishes the error and
//! re-subscribes after a backoff delay, for as long as the handle exists.
//!
//! ```text
//!   subscribe ──► Loading ──► Ready(todos) ──► Ready(todos') ...
//!                    │              │
//!                    ▼              ▼
//!              Error(message) ◄─────┘   (backoff, then re-subscribe)
//! ```
//!
//! Statuses are published on a `watch` channel: observers always see the
//! latest status and never a stale one after a newer was published.
//! Dropping the [`Subscription`] cancels the task and releases the remote
//! subscription; nothing is delivered after that.

use crate::metrics::SubscriptionMetrics;
use crate::retry::RetryPolicy;
use futures::{Stream, StreamExt};
use shared_todos_core::remote::{Query, RemoteError, RemoteStore};
use shared_todos_core::todo::Todo;
use shared_todos_core::view::LoadState;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Errors observed on the subscription path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The store could not be reached
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the query
    #[error("Subscription rejected: {0}")]
    Rejected(String),

    /// The stream ended without an error
    #[error("Subscription stream ended")]
    StreamEnded,

    /// The store closed the connection
    #[error("Connection closed by remote store")]
    Closed,
}

impl From<RemoteError> for SubscriptionError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unavailable(message) => Self::Unavailable(message),
            RemoteError::Rejected(message) => Self::Rejected(message),
            RemoteError::Closed => Self::Closed,
        }
    }
}

/// Latest state of a live subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// No snapshot yet
    Loading,
    /// Complete current result set
    Ready(Vec<Todo>),
    /// The subscription is failing; retries continue
    Error(String),
}

impl SubscriptionStatus {
    /// Connection state for presentation
    #[must_use]
    pub fn load_state(&self) -> LoadState {
        match self {
            Self::Loading => LoadState::Loading,
            Self::Ready(_) => LoadState::Ready,
            Self::Error(message) => LoadState::Error {
                message: message.clone(),
            },
        }
    }
}

/// Opens live subscriptions against a remote store.
#[derive(Clone)]
pub struct Connector {
    remote: Arc<dyn RemoteStore>,
    policy: RetryPolicy,
}

impl Connector {
    /// Create a connector for `remote` that retries with `policy`
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, policy: RetryPolicy) -> Self {
        Self { remote, policy }
    }

    /// Open a live subscription.
    ///
    /// Must be called from within a Tokio runtime. The returned handle
    /// starts in [`SubscriptionStatus::Loading`].
    #[must_use]
    pub fn subscribe(&self, query: Query) -> Subscription {
        let (tx, rx) = watch::channel(SubscriptionStatus::Loading);
        let remote = Arc::clone(&self.remote);
        let policy = self.policy.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                () = run(remote, query, policy, &tx) => {},
                () = tx.closed() => {
                    tracing::debug!("Subscription dropped by every observer");
                },
            }
        });

        Subscription {
            status: rx,
            task: Some(task),
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Subscribe, forward snapshots, back off on faults; repeat until the retry
/// budget is exhausted.
async fn run(
    remote: Arc<dyn RemoteStore>,
    query: Query,
    policy: RetryPolicy,
    tx: &watch::Sender<SubscriptionStatus>,
) {
    let mut attempt = 0usize;

    loop {
        let error = match remote.subscribe(query.clone()).await {
            Ok(mut stream) => loop {
                match stream.next().await {
                    Some(Ok(todos)) => {
                        attempt = 0;
                        SubscriptionMetrics::record_snapshot(todos.len());
                        tracing::debug!(todos = todos.len(), "Snapshot received");
                        tx.send_replace(SubscriptionStatus::Ready(todos));
                    },
                    Some(Err(error)) => break SubscriptionError::from(error),
                    None => break SubscriptionError::StreamEnded,
                }
            },
            Err(error) => SubscriptionError::from(error),
        };

        SubscriptionMetrics::record_error();
        tracing::warn!(%error, attempt, "Subscription failed");
        let message = error.to_string();
        tx.send_if_modified(|status| {
            if matches!(status, SubscriptionStatus::Error(current) if *current == message) {
                return false;
            }
            *status = SubscriptionStatus::Error(message);
            true
        });

        if !policy.should_retry(attempt) {
            tracing::error!(attempt, "Subscription retries exhausted");
            return;
        }

        let delay = policy.backoff(attempt);
        tracing::info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Re-subscribing after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
        SubscriptionMetrics::record_reconnect();
    }
}

/// Handle to a live subscription.
///
/// Dropping the handle cancels the subscription.
#[derive(Debug)]
pub struct Subscription {
    status: watch::Receiver<SubscriptionStatus>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Latest status
    #[must_use]
    pub fn current(&self) -> SubscriptionStatus {
        self.status.borrow().clone()
    }

    /// Wait for the next status change.
    ///
    /// Returns `None` once the subscription has stopped for good.
    pub async fn changed(&mut self) -> Option<SubscriptionStatus> {
        self.status.changed().await.ok()?;
        Some(self.status.borrow_and_update().clone())
    }

    /// A receiver observing the same statuses
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.clone()
    }

    /// Statuses as a stream, starting with the current one.
    ///
    /// The subscription stays open for as long as the stream is alive.
    pub fn into_stream(mut self) -> impl Stream<Item = SubscriptionStatus> + Send {
        let first = self.status.borrow_and_update().clone();
        futures::stream::once(async move { first }).chain(futures::stream::unfold(
            self,
            |mut subscription| async move {
                let status = subscription.changed().await?;
                Some((status, subscription))
            },
        ))
    }

    /// Stop the subscription and wait for its task to finish
    pub async fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
