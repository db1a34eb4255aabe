//! Boundary with the external shared store.
//!
//! The store is an external collaborator: it owns storage, replication and
//! conflict resolution. This module only describes what the client consumes
//! from it:
//!
//! - a live [`Query`] subscription producing full snapshots
//! - an atomic transaction interface accepting a [`Batch`] of [`Operation`]s
//!
//! ```text
//!   ┌────────────┐  subscribe(Query)   ┌──────────────┐
//!   │  Connector │ ◄────────────────── │              │
//!   └────────────┘   full snapshots    │ RemoteStore  │
//!   ┌────────────┐  transact(Batch)    │  (external)  │
//!   │ Dispatcher │ ──────────────────► │              │
//!   └────────────┘   all-or-nothing    └──────────────┘
//! ```

use crate::todo::{Todo, TodoId, TodoPatch};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Name of the single shared collection.
pub const TODOS: &str = "todos";

/// Errors reported by the external store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport or availability failure (retryable from the store's side)
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// The store refused a batch (validation, permissions, id collision,
    /// missing record). Nothing from the batch was applied.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// The connection was closed by the store
    #[error("Connection closed by remote store")]
    Closed,
}

/// A live query over the shared collection.
///
/// The collection is always fetched whole; filtering happens client-side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Collection name
    pub collection: String,
    /// Server-side filter (never used)
    pub filter: Option<serde_json::Value>,
}

impl Query {
    /// Query for the whole `todos` collection
    #[must_use]
    pub fn todos() -> Self {
        Self {
            collection: TODOS.to_string(),
            filter: None,
        }
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::todos()
    }
}

/// Record-level write addressed by collection and id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    /// Insert a new record
    Create {
        /// The full record
        todo: Todo,
    },
    /// Change mutable fields of an existing record
    Update {
        /// Target record
        id: TodoId,
        /// Fields to change
        patch: TodoPatch,
    },
    /// Remove a record permanently
    Delete {
        /// Target record
        id: TodoId,
    },
}

impl Operation {
    /// Collection the operation is addressed to
    #[must_use]
    pub const fn collection(&self) -> &'static str {
        TODOS
    }

    /// Record the operation is addressed to
    #[must_use]
    pub const fn id(&self) -> &TodoId {
        match self {
            Self::Create { todo } => &todo.id,
            Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }
}

/// Ordered set of operations applied atomically by the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    operations: Vec<Operation>,
}

impl Batch {
    /// Creates an empty batch
    #[must_use]
    pub const fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Batch holding a single operation
    #[must_use]
    pub fn single(operation: Operation) -> Self {
        Self {
            operations: vec![operation],
        }
    }

    /// Appends an operation
    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Number of operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch holds no operations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations in application order
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Consumes the batch, returning its operations
    #[must_use]
    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }
}

impl FromIterator<Operation> for Batch {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Batch {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

/// Stream of full snapshots for a query.
///
/// Every `Ok` item is the complete current result set, never a diff. An
/// `Err` item reports a fault; the stream may end after it.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Vec<Todo>, RemoteError>> + Send>>;

/// The external shared store.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so the store can be shared as
/// `Arc<dyn RemoteStore>` by the connector, the dispatcher and effects.
pub trait RemoteStore: Send + Sync {
    /// Opens a live subscription.
    ///
    /// Dropping the returned stream releases the subscription.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the subscription cannot be established.
    fn subscribe(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream, RemoteError>> + Send + '_>>;

    /// Applies a batch atomically: either every operation is applied or none is.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Rejected`] if the store refuses the batch, or
    /// [`RemoteError::Unavailable`] on transport failure.
    fn transact(
        &self,
        batch: Batch,
    ) -> Pin<Box<dyn Future<Output = Result<(), RemoteError>> + Send + '_>>;
}
