//! Translation of user intents into atomic write batches.
//!
//! Every function here is pure: it only inspects its arguments and returns
//! the [`Batch`] the store must apply. No local state is touched; the next
//! snapshot is the only place the effect of a mutation becomes visible.
//!
//! Updates never read-modify-write on the client. Each operation carries the
//! complete intended value (`done = true`, not "flip whatever is stored").

use crate::remote::{Batch, Operation, RemoteError};
use crate::todo::{Color, Deadline, Todo, TodoId, TodoPatch};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The user-facing mutation intents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Create a todo
    Add,
    /// Delete one todo
    Delete,
    /// Flip one todo's completion flag
    ToggleDone,
    /// Change color or deadline of one todo
    Update,
    /// Delete every completed todo
    DeleteCompleted,
    /// Set every todo's completion flag to the toggle-all target
    ToggleAll,
}

impl Intent {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::ToggleDone => "toggle_done",
            Self::Update => "update",
            Self::DeleteCompleted => "delete_completed",
            Self::ToggleAll => "toggle_all",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced to the caller when a mutation does not go through.
///
/// Mutations are never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// The store refused the batch; nothing was applied
    #[error("Mutation rejected: {reason}")]
    Rejected {
        /// Reason reported by the store
        reason: String,
    },

    /// The batch could not be delivered
    #[error("Mutation could not be delivered: {0}")]
    Transport(String),
}

impl From<RemoteError> for MutationError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Rejected(reason) => Self::Rejected { reason },
            RemoteError::Unavailable(message) => Self::Transport(message),
            RemoteError::Closed => Self::Transport("connection closed".to_string()),
        }
    }
}

/// Result of a successfully handled intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    /// The store accepted a batch with this many operations
    Committed {
        /// Operations in the batch
        operations: usize,
    },
    /// Nothing to send (empty bulk target or unknown record)
    Skipped,
}

/// Toggle-all target for a snapshot.
///
/// `true` unless every todo is already done. An empty list yields `true`
/// (vacuous "every" is true, negated).
#[must_use]
pub fn toggle_all_target(todos: &[Todo]) -> bool {
    !todos.iter().all(|todo| todo.done)
}

/// Builders for the batch each intent produces.
pub struct TodoBatches;

impl TodoBatches {
    /// Create a new open todo.
    #[must_use]
    pub fn add(
        id: TodoId,
        text: impl Into<String>,
        color: Option<Color>,
        deadline: Option<Deadline>,
        created_at: i64,
    ) -> Batch {
        let mut todo = Todo::new(id, text, created_at).with_color(color.unwrap_or_default());
        todo.deadline = deadline;
        Batch::single(Operation::Create { todo })
    }

    /// Delete one todo.
    #[must_use]
    pub fn delete(id: TodoId) -> Batch {
        Batch::single(Operation::Delete { id })
    }

    /// Flip the completion flag of `todo` as currently observed.
    #[must_use]
    pub fn toggle_done(todo: &Todo) -> Batch {
        Batch::single(Operation::Update {
            id: todo.id.clone(),
            patch: TodoPatch::done(!todo.done),
        })
    }

    /// Apply a patch to one todo.
    #[must_use]
    pub fn update(id: TodoId, patch: TodoPatch) -> Batch {
        Batch::single(Operation::Update { id, patch })
    }

    /// Delete every todo that is done at call time.
    #[must_use]
    pub fn delete_completed(todos: &[Todo]) -> Batch {
        todos
            .iter()
            .filter(|todo| todo.done)
            .map(|todo| Operation::Delete {
                id: todo.id.clone(),
            })
            .collect()
    }

    /// Set every todo to the toggle-all target of `todos`.
    #[must_use]
    pub fn toggle_all(todos: &[Todo]) -> Batch {
        let target = toggle_all_target(todos);
        todos
            .iter()
            .map(|todo| Operation::Update {
                id: todo.id.clone(),
                patch: TodoPatch::done(target),
            })
            .collect()
    }
}
