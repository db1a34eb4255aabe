//! The shared to-do list feature: state, actions, environment and reducer.
//!
//! Two kinds of input reach the reducer:
//!
//! - **intents** from the presentation layer (`Add`, `ToggleAll`, ...). They
//!   never change the local todos; they only emit a write effect.
//! - **feedback** from the outside world: subscription statuses delivered by
//!   the connector, and the outcome of each write.
//!
//! Visible todos change only when a snapshot arrives, so the list can never
//! diverge from the authoritative remote state.

use crate::batch::{DispatchOutcome, Intent, MutationError, TodoBatches};
use crate::effect::Effect;
use crate::environment::{Clock, Transactor};
use crate::reducer::Reducer;
use crate::remote::Batch;
use crate::todo::{Color, Deadline, Todo, TodoId, TodoPatch};
use crate::view::{LoadState, TodoViewModel, TodoViews};
use crate::{SmallVec, smallvec};
use serde::{Deserialize, Serialize};
use shared_todos_macros::Action;
use std::fmt;
use std::sync::Arc;

/// Correlates an intent with the feedback action reporting its outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(u64);

impl Ticket {
    /// Creates a ticket
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State of the list as observed by one client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TodoListState {
    /// Subscription state
    pub status: LoadState,
    /// Latest snapshot, in store order. Empty unless `status` is `Ready`.
    pub todos: Vec<Todo>,
    /// Views derived from `todos`
    pub views: TodoViews,
    /// Last rejected mutation (transient)
    pub last_mutation_error: Option<String>,
    /// Intents dispatched whose outcome has not been reported yet
    pub in_flight: usize,
}

impl TodoListState {
    /// Creates the initial (loading) state
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: LoadState::Loading,
            todos: Vec::new(),
            views: TodoViews::empty(),
            last_mutation_error: None,
            in_flight: 0,
        }
    }

    /// Returns a todo of the current snapshot by id
    #[must_use]
    pub fn get(&self, id: &TodoId) -> Option<&Todo> {
        self.todos.iter().find(|todo| &todo.id == id)
    }

    /// Presentation model for the current state
    #[must_use]
    pub fn view_model(&self) -> TodoViewModel {
        TodoViewModel::new(
            &self.status,
            &self.views,
            self.last_mutation_error.as_deref(),
        )
    }

    fn clear_snapshot(&mut self) {
        self.todos.clear();
        self.views = TodoViews::empty();
    }
}

/// Actions for the to-do list.
#[derive(Action, Clone, Debug, PartialEq, Eq)]
pub enum TodoListAction {
    // ========== Intents ==========
    /// Create a todo with a client-generated id
    #[intent]
    Add {
        /// Correlation ticket
        ticket: Ticket,
        /// Id generated before dispatch
        id: TodoId,
        /// Description
        text: String,
        /// Palette tag (defaults to no color)
        color: Option<Color>,
        /// Due date
        deadline: Option<Deadline>,
    },

    /// Delete a todo
    #[intent]
    Delete {
        /// Correlation ticket
        ticket: Ticket,
        /// Target
        id: TodoId,
    },

    /// Flip a todo's completion flag
    #[intent]
    ToggleDone {
        /// Correlation ticket
        ticket: Ticket,
        /// Target
        id: TodoId,
    },

    /// Change color or deadline of a todo
    #[intent]
    Update {
        /// Correlation ticket
        ticket: Ticket,
        /// Target
        id: TodoId,
        /// Changes
        patch: TodoPatch,
    },

    /// Delete every completed todo of the current snapshot
    #[intent]
    DeleteCompleted {
        /// Correlation ticket
        ticket: Ticket,
    },

    /// Set every todo of the current snapshot to the toggle-all target
    #[intent]
    ToggleAll {
        /// Correlation ticket
        ticket: Ticket,
    },

    /// Clear the last mutation error
    #[intent]
    DismissError,

    // ========== Feedback ==========
    /// A full snapshot arrived
    #[feedback]
    SnapshotReceived {
        /// Complete result set
        todos: Vec<Todo>,
    },

    /// The subscription failed; the connector keeps retrying
    #[feedback]
    SubscriptionFailed {
        /// Human-readable description
        message: String,
    },

    /// The store accepted the batch of an intent
    #[feedback]
    MutationCommitted {
        /// Correlation ticket
        ticket: Ticket,
        /// Intent that produced the batch
        intent: Intent,
        /// Operations in the batch
        operations: usize,
    },

    /// The intent had nothing to write
    #[feedback]
    MutationSkipped {
        /// Correlation ticket
        ticket: Ticket,
        /// Intent
        intent: Intent,
    },

    /// The batch was rejected or could not be delivered
    #[feedback]
    MutationRejected {
        /// Correlation ticket
        ticket: Ticket,
        /// Intent that produced the batch
        intent: Intent,
        /// What went wrong
        error: MutationError,
    },
}

impl TodoListAction {
    /// Ticket carried by intents and mutation outcomes
    #[must_use]
    pub const fn ticket(&self) -> Option<Ticket> {
        match self {
            Self::Add { ticket, .. }
            | Self::Delete { ticket, .. }
            | Self::ToggleDone { ticket, .. }
            | Self::Update { ticket, .. }
            | Self::DeleteCompleted { ticket }
            | Self::ToggleAll { ticket }
            | Self::MutationCommitted { ticket, .. }
            | Self::MutationSkipped { ticket, .. }
            | Self::MutationRejected { ticket, .. } => Some(*ticket),
            Self::DismissError
            | Self::SnapshotReceived { .. }
            | Self::SubscriptionFailed { .. } => None,
        }
    }

    /// Outcome reported by a mutation feedback action
    #[must_use]
    pub fn mutation_outcome(&self) -> Option<Result<DispatchOutcome, MutationError>> {
        match self {
            Self::MutationCommitted { operations, .. } => Some(Ok(DispatchOutcome::Committed {
                operations: *operations,
            })),
            Self::MutationSkipped { .. } => Some(Ok(DispatchOutcome::Skipped)),
            Self::MutationRejected { error, .. } => Some(Err(error.clone())),
            _ => None,
        }
    }
}

/// Environment dependencies for the to-do list reducer
#[derive(Clone)]
pub struct TodoListEnvironment {
    /// Clock for creation timestamps
    pub clock: Arc<dyn Clock>,
    /// Write path to the remote store
    pub transactor: Arc<dyn Transactor>,
}

impl TodoListEnvironment {
    /// Creates a new `TodoListEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, transactor: Arc<dyn Transactor>) -> Self {
        Self { clock, transactor }
    }
}

/// Reducer for the shared to-do list
#[derive(Clone, Debug, Default)]
pub struct TodoListReducer;

impl TodoListReducer {
    /// Creates a new `TodoListReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Emits the write for an intent, queued behind earlier writes.
    fn submit(
        state: &mut TodoListState,
        env: &TodoListEnvironment,
        ticket: Ticket,
        intent: Intent,
        batch: Batch,
    ) -> SmallVec<[Effect<TodoListAction>; 4]> {
        state.in_flight += 1;
        let transactor = Arc::clone(&env.transactor);

        smallvec![Effect::Serial(Box::pin(async move {
            let action = match transactor.transact(intent, batch).await {
                Ok(DispatchOutcome::Committed { operations }) => {
                    TodoListAction::MutationCommitted {
                        ticket,
                        intent,
                        operations,
                    }
                },
                Ok(DispatchOutcome::Skipped) => TodoListAction::MutationSkipped { ticket, intent },
                Err(error) => TodoListAction::MutationRejected {
                    ticket,
                    intent,
                    error,
                },
            };
            Some(action)
        }))]
    }

    /// Reports an intent that has nothing to write.
    fn skip(
        state: &mut TodoListState,
        ticket: Ticket,
        intent: Intent,
    ) -> SmallVec<[Effect<TodoListAction>; 4]> {
        state.in_flight += 1;
        smallvec![Effect::Future(Box::pin(async move {
            Some(TodoListAction::MutationSkipped { ticket, intent })
        }))]
    }

    fn settle(state: &mut TodoListState) {
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

impl Reducer for TodoListReducer {
    type State = TodoListState;
    type Action = TodoListAction;
    type Environment = TodoListEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        tracing::trace!(action = action.name(), "Reducing todo list action");

        match action {
            // ========== Intents ==========
            TodoListAction::Add {
                ticket,
                id,
                text,
                color,
                deadline,
            } => {
                let created_at = env.clock.now_millis();
                let batch = TodoBatches::add(id, text, color, deadline, created_at);
                Self::submit(state, env, ticket, Intent::Add, batch)
            },

            TodoListAction::Delete { ticket, id } => {
                Self::submit(state, env, ticket, Intent::Delete, TodoBatches::delete(id))
            },

            TodoListAction::ToggleDone { ticket, id } => {
                let Some(todo) = state.get(&id) else {
                    tracing::warn!(todo_id = %id, "Toggle requested for a todo not in the snapshot");
                    return Self::skip(state, ticket, Intent::ToggleDone);
                };
                let batch = TodoBatches::toggle_done(todo);
                Self::submit(state, env, ticket, Intent::ToggleDone, batch)
            },

            TodoListAction::Update { ticket, id, patch } => {
                if patch.is_empty() {
                    return Self::skip(state, ticket, Intent::Update);
                }
                Self::submit(state, env, ticket, Intent::Update, TodoBatches::update(id, patch))
            },

            TodoListAction::DeleteCompleted { ticket } => {
                let batch = TodoBatches::delete_completed(&state.todos);
                Self::submit(state, env, ticket, Intent::DeleteCompleted, batch)
            },

            TodoListAction::ToggleAll { ticket } => {
                let batch = TodoBatches::toggle_all(&state.todos);
                Self::submit(state, env, ticket, Intent::ToggleAll, batch)
            },

            TodoListAction::DismissError => {
                state.last_mutation_error = None;
                SmallVec::new()
            },

            // ========== Feedback ==========
            TodoListAction::SnapshotReceived { todos } => {
                state.views = TodoViews::build(&todos);
                state.todos = todos;
                state.status = LoadState::Ready;
                SmallVec::new()
            },

            TodoListAction::SubscriptionFailed { message } => {
                state.status = LoadState::Error { message };
                state.clear_snapshot();
                SmallVec::new()
            },

            TodoListAction::MutationCommitted { .. } => {
                Self::settle(state);
                state.last_mutation_error = None;
                SmallVec::new()
            },

            TodoListAction::MutationSkipped { .. } => {
                Self::settle(state);
                SmallVec::new()
            },

            TodoListAction::MutationRejected {
                ticket,
                intent,
                error,
            } => {
                Self::settle(state);
                tracing::warn!(%ticket, %intent, error = %error, "Mutation rejected");
                state.last_mutation_error = Some(error.to_string());
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_are_classified() {
        let intent = TodoListAction::ToggleAll {
            ticket: Ticket::new(1),
        };
        assert!(intent.is_intent());
        assert!(!intent.is_feedback());
        assert_eq!(intent.name(), "ToggleAll");

        let feedback = TodoListAction::SnapshotReceived { todos: vec![] };
        assert!(feedback.is_feedback());
        assert_eq!(feedback.ticket(), None);
    }

    #[test]
    fn mutation_outcome_only_for_mutation_feedback() {
        let ticket = Ticket::new(7);
        let committed = TodoListAction::MutationCommitted {
            ticket,
            intent: Intent::Add,
            operations: 1,
        };
        assert_eq!(
            committed.mutation_outcome(),
            Some(Ok(DispatchOutcome::Committed { operations: 1 }))
        );
        assert_eq!(committed.ticket(), Some(ticket));
        assert_eq!(TodoListAction::DismissError.mutation_outcome(), None);
    }

    #[test]
    fn initial_state_is_loading_and_empty() {
        let state = TodoListState::new();
        assert_eq!(state.status, LoadState::Loading);
        assert!(state.todos.is_empty());
        assert!(state.view_model().grouped_todos.is_empty());
    }
}
