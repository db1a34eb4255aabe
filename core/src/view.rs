//! Derived views over a snapshot.
//!
//! [`TodoViews::build`] is a pure function of the snapshot slice: it never
//! mutates its input and keeps no state between calls, so it can run on
//! every snapshot delivery.

use crate::batch::toggle_all_target;
use crate::todo::Todo;
use serde::{Deserialize, Serialize};

/// Todos split by presence of a deadline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedTodos {
    /// Todos with a deadline, earliest first; ties keep snapshot order
    pub with_deadline: Vec<Todo>,
    /// Todos without a deadline, in snapshot order
    pub without_deadline: Vec<Todo>,
}

impl GroupedTodos {
    /// Total number of todos across both groups
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_deadline.len() + self.without_deadline.len()
    }

    /// Returns true if both groups are empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.with_deadline.is_empty() && self.without_deadline.is_empty()
    }
}

/// Everything derived from one snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoViews {
    /// Partitioned and sorted todos
    pub grouped: GroupedTodos,
    /// Number of todos not done
    pub remaining_count: usize,
    /// Number of todos done
    pub completed_count: usize,
    /// Value a toggle-all would assign to every todo
    pub toggle_all_target: bool,
}

impl TodoViews {
    /// Builds the views for a snapshot.
    #[must_use]
    pub fn build(todos: &[Todo]) -> Self {
        let (mut with_deadline, without_deadline): (Vec<Todo>, Vec<Todo>) = todos
            .iter()
            .cloned()
            .partition(|todo| todo.deadline.is_some());

        // `sort_by_key` is stable, so equal deadlines keep snapshot order.
        with_deadline.sort_by_key(|todo| todo.deadline);

        let remaining_count = todos.iter().filter(|todo| !todo.done).count();

        Self {
            grouped: GroupedTodos {
                with_deadline,
                without_deadline,
            },
            remaining_count,
            completed_count: todos.len() - remaining_count,
            toggle_all_target: toggle_all_target(todos),
        }
    }

    /// Views of an empty collection
    #[must_use]
    pub fn empty() -> Self {
        Self::build(&[])
    }
}

/// Connection state shown to the user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LoadState {
    /// No snapshot received yet
    #[default]
    Loading,
    /// Showing the latest snapshot
    Ready,
    /// The subscription is failing; retries continue in the background
    Error {
        /// Human-readable description
        message: String,
    },
}

impl LoadState {
    /// Returns true once a snapshot is being shown
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// What the presentation layer renders.
///
/// Only a `Ready` model carries todos and counts; loading and error models
/// are empty so that no stale list is ever rendered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoViewModel {
    /// Connection state
    pub loading_state: LoadState,
    /// Subscription error, when `loading_state` is `Error`
    pub error_message: Option<String>,
    /// Last rejected mutation, until dismissed or superseded
    pub mutation_error: Option<String>,
    /// Partitioned todos
    pub grouped_todos: GroupedTodos,
    /// Number of todos not done
    pub remaining_count: usize,
    /// Value a toggle-all would assign
    pub toggle_all_target: bool,
}

impl TodoViewModel {
    /// Builds the presentation model from load state and views.
    #[must_use]
    pub fn new(loading_state: &LoadState, views: &TodoViews, mutation_error: Option<&str>) -> Self {
        let mutation_error = mutation_error.map(str::to_string);
        match loading_state {
            LoadState::Ready => Self {
                loading_state: LoadState::Ready,
                error_message: None,
                mutation_error,
                grouped_todos: views.grouped.clone(),
                remaining_count: views.remaining_count,
                toggle_all_target: views.toggle_all_target,
            },
            LoadState::Loading => Self {
                loading_state: LoadState::Loading,
                mutation_error,
                toggle_all_target: true,
                ..Self::default()
            },
            LoadState::Error { message } => Self {
                loading_state: loading_state.clone(),
                error_message: Some(message.clone()),
                mutation_error,
                toggle_all_target: true,
                ..Self::default()
            },
        }
    }
}
