//! Reducer tests for the shared to-do list.

use shared_todos_core::batch::{Intent, MutationError};
use shared_todos_core::environment::{MonotonicClock, Transactor};
use shared_todos_core::reducer::Reducer;
use shared_todos_core::list::{
    Ticket, TodoListAction, TodoListEnvironment, TodoListReducer, TodoListState,
};
use shared_todos_core::remote::Operation;
use shared_todos_core::todo::{Color, Deadline, TodoId, TodoPatch};
use shared_todos_core::view::LoadState;
use shared_todos_testing::helpers::{done_todo, todo};
use shared_todos_testing::mocks::TEST_EPOCH_MILLIS;
use shared_todos_testing::reducer_test::assertions;
use shared_todos_testing::{
    RecordingTransactor, ReducerTest, SteppingClock, collect_feedback, test_clock,
};
use std::sync::Arc;

fn env_with(transactor: Arc<RecordingTransactor>) -> TodoListEnvironment {
    TodoListEnvironment::new(Arc::new(test_clock()), transactor)
}

fn test_env() -> TodoListEnvironment {
    env_with(Arc::new(RecordingTransactor::new()))
}

fn ready(todos: Vec<shared_todos_core::todo::Todo>) -> TodoListState {
    let mut state = TodoListState::new();
    let _ = TodoListReducer::new().reduce(
        &mut state,
        TodoListAction::SnapshotReceived { todos },
        &test_env(),
    );
    state
}

const T1: Ticket = Ticket::new(1);

// ========== Snapshots ==========

#[test]
fn snapshot_replaces_list_and_views() {
    let snapshot = vec![todo("a"), done_todo("b")];

    ReducerTest::new(TodoListReducer::new())
        .with_env(test_env())
        .given_state(TodoListState::new())
        .when_action(TodoListAction::SnapshotReceived {
            todos: snapshot.clone(),
        })
        .then_state(move |state| {
            assert_eq!(state.status, LoadState::Ready);
            assert_eq!(state.todos, snapshot);
            assert_eq!(state.views.remaining_count, 1);
            assert_eq!(state.views.completed_count, 1);
            assert!(state.views.toggle_all_target);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn later_snapshot_fully_replaces_earlier_one() {
    let first = vec![todo("a"), todo("b")];
    let second = vec![todo("c")];

    ReducerTest::new(TodoListReducer::new())
        .with_env(test_env())
        .given_state(ready(first))
        .when_action(TodoListAction::SnapshotReceived {
            todos: second.clone(),
        })
        .then_state(move |state| {
            assert_eq!(state.todos, second);
            assert_eq!(state.views.grouped.len(), 1);
        })
        .run();
}

#[test]
fn failure_hides_list_and_keeps_message() {
    ReducerTest::new(TodoListReducer::new())
        .with_env(test_env())
        .given_state(ready(vec![todo("a")]))
        .when_action(TodoListAction::SubscriptionFailed {
            message: "connection reset".into(),
        })
        .then_state(|state| {
            assert_eq!(
                state.status,
                LoadState::Error {
                    message: "connection reset".into()
                }
            );
            assert!(state.todos.is_empty());
            let model = state.view_model();
            assert!(model.grouped_todos.is_empty());
            assert_eq!(model.error_message.as_deref(), Some("connection reset"));
        })
        .run();
}

// ========== Intents ==========

#[tokio::test]
async fn add_writes_new_todo_without_touching_local_list() {
    let transactor = Arc::new(RecordingTransactor::new());
    let id = TodoId::new();
    let deadline = Deadline::from_ymd(2025, 3, 1).unwrap();

    ReducerTest::new(TodoListReducer::new())
        .with_env(env_with(Arc::clone(&transactor)))
        .given_state(ready(vec![]))
        .when_action(TodoListAction::Add {
            ticket: T1,
            id: id.clone(),
            text: "Buy milk".into(),
            color: Some(Color::LightBlue),
            deadline: Some(deadline),
        })
        .then_state(|state| {
            assert!(state.todos.is_empty(), "no optimistic insert");
            assert_eq!(state.in_flight, 1);
        })
        .then_effects(assertions::assert_has_serial_effect)
        .then_feedback(|actions| {
            assert_eq!(
                actions,
                &[TodoListAction::MutationCommitted {
                    ticket: T1,
                    intent: Intent::Add,
                    operations: 1,
                }]
            );
        })
        .run_async()
        .await;

    let calls = transactor.calls();
    let [(Intent::Add, batch)] = calls.as_slice() else {
        panic!("expected one add, got {calls:?}");
    };
    let [Operation::Create { todo }] = batch.operations() else {
        panic!("expected a create, got {batch:?}");
    };
    assert_eq!(todo.id, id);
    assert!(!todo.done);
    assert_eq!(todo.created_at, TEST_EPOCH_MILLIS);
    assert_eq!(todo.color, Color::LightBlue);
    assert_eq!(todo.deadline, Some(deadline));
}

#[tokio::test]
async fn created_at_never_decreases() {
    // The wall clock goes back 500ms between the two readings
    let clock = Arc::new(MonotonicClock::new(SteppingClock::new(2_000, -500)));
    let transactor = Arc::new(RecordingTransactor::new());
    let env = TodoListEnvironment::new(clock.clone(), transactor.clone());
    let reducer = TodoListReducer::new();
    let mut state = ready(vec![]);

    for (n, text) in (1..).zip(["first", "second"]) {
        let effects = reducer.reduce(
            &mut state,
            TodoListAction::Add {
                ticket: Ticket::new(n),
                id: TodoId::new(),
                text: text.into(),
                color: None,
                deadline: None,
            },
            &env,
        );
        let _ = collect_feedback(effects).await;
    }

    let stamps: Vec<i64> = transactor
        .batches()
        .iter()
        .flat_map(|batch| batch.operations().to_vec())
        .filter_map(|op| match op {
            Operation::Create { todo } => Some(todo.created_at),
            _ => None,
        })
        .collect();
    assert_eq!(stamps, vec![2_000, 2_000]);
}

#[tokio::test]
async fn toggle_done_writes_inverse_of_observed_value() {
    let transactor = Arc::new(RecordingTransactor::new());
    let item = done_todo("a");

    ReducerTest::new(TodoListReducer::new())
        .with_env(env_with(Arc::clone(&transactor)))
        .given_state(ready(vec![item.clone()]))
        .when_action(TodoListAction::ToggleDone {
            ticket: T1,
            id: item.id.clone(),
        })
        .then_state(|state| assert!(state.todos[0].done, "local list unchanged"))
        .run_async()
        .await;

    let batches = transactor.batches();
    assert_eq!(
        batches[0].operations(),
        &[Operation::Update {
            id: item.id,
            patch: TodoPatch::done(false),
        }]
    );
}

#[tokio::test]
async fn toggle_done_of_unknown_todo_is_skipped() {
    let transactor = Arc::new(RecordingTransactor::new());

    ReducerTest::new(TodoListReducer::new())
        .with_env(env_with(Arc::clone(&transactor)))
        .given_state(ready(vec![todo("a")]))
        .when_action(TodoListAction::ToggleDone {
            ticket: T1,
            id: TodoId::new(),
        })
        .then_effects(assertions::assert_has_future_effect)
        .then_feedback(|actions| {
            assert_eq!(
                actions,
                &[TodoListAction::MutationSkipped {
                    ticket: T1,
                    intent: Intent::ToggleDone,
                }]
            );
        })
        .run_async()
        .await;

    assert!(transactor.calls().is_empty());
}

#[tokio::test]
async fn empty_update_is_skipped() {
    let item = todo("a");
    ReducerTest::new(TodoListReducer::new())
        .with_env(test_env())
        .given_state(ready(vec![item.clone()]))
        .when_action(TodoListAction::Update {
            ticket: T1,
            id: item.id,
            patch: TodoPatch::default(),
        })
        .then_feedback(|actions| {
            assert!(matches!(actions, [TodoListAction::MutationSkipped { .. }]));
        })
        .run_async()
        .await;
}

#[tokio::test]
async fn update_clears_deadline() {
    let transactor = Arc::new(RecordingTransactor::new());
    let item = todo("a").with_deadline(Deadline::from_ymd(2025, 1, 2).unwrap());

    ReducerTest::new(TodoListReducer::new())
        .with_env(env_with(Arc::clone(&transactor)))
        .given_state(ready(vec![item.clone()]))
        .when_action(TodoListAction::Update {
            ticket: T1,
            id: item.id.clone(),
            patch: TodoPatch::deadline(None),
        })
        .run_async()
        .await;

    let calls = transactor.calls();
    let [(Intent::Update, batch)] = calls.as_slice() else {
        panic!("expected one update");
    };
    assert_eq!(
        batch.operations(),
        &[Operation::Update {
            id: item.id,
            patch: TodoPatch::deadline(None),
        }]
    );
}

#[tokio::test]
async fn delete_completed_uses_current_snapshot() {
    let transactor = Arc::new(RecordingTransactor::new());
    let snapshot = vec![done_todo("a"), todo("b"), done_todo("c")];
    let expected: Vec<TodoId> = vec![snapshot[0].id.clone(), snapshot[2].id.clone()];

    ReducerTest::new(TodoListReducer::new())
        .with_env(env_with(Arc::clone(&transactor)))
        .given_state(ready(snapshot))
        .when_action(TodoListAction::DeleteCompleted { ticket: T1 })
        .then_feedback(|actions| {
            assert!(matches!(
                actions,
                [TodoListAction::MutationCommitted { operations: 2, .. }]
            ));
        })
        .run_async()
        .await;

    let deleted: Vec<TodoId> = transactor.batches()[0]
        .operations()
        .iter()
        .map(|op| op.id().clone())
        .collect();
    assert_eq!(deleted, expected);
}

#[tokio::test]
async fn delete_completed_with_nothing_done_is_skipped() {
    ReducerTest::new(TodoListReducer::new())
        .with_env(test_env())
        .given_state(ready(vec![todo("a")]))
        .when_action(TodoListAction::DeleteCompleted { ticket: T1 })
        .then_feedback(|actions| {
            assert!(matches!(actions, [TodoListAction::MutationSkipped { .. }]));
        })
        .run_async()
        .await;
}

#[tokio::test]
async fn toggle_all_sets_every_todo_to_target() {
    let transactor = Arc::new(RecordingTransactor::new());

    ReducerTest::new(TodoListReducer::new())
        .with_env(env_with(Arc::clone(&transactor)))
        .given_state(ready(vec![done_todo("a"), todo("b")]))
        .when_action(TodoListAction::ToggleAll { ticket: T1 })
        .run_async()
        .await;

    let batch = &transactor.batches()[0];
    assert_eq!(batch.len(), 2);
    assert!(batch.operations().iter().all(|op| matches!(
        op,
        Operation::Update { patch, .. } if patch.done == Some(true)
    )));
}

// ========== Outcomes ==========

#[tokio::test]
async fn rejection_is_reported_and_dismissable() {
    let transactor = Arc::new(RecordingTransactor::new());
    transactor.fail_next(MutationError::Rejected {
        reason: "permission denied".into(),
    });
    let env = env_with(Arc::clone(&transactor));
    let reducer = TodoListReducer::new();
    let item = todo("a");
    let mut state = ready(vec![item.clone()]);

    let effects = reducer.reduce(
        &mut state,
        TodoListAction::Delete {
            ticket: T1,
            id: item.id.clone(),
        },
        &env,
    );
    let feedback = collect_feedback(effects).await;
    assert_eq!(feedback.len(), 1);
    let _ = reducer.reduce(&mut state, feedback[0].clone(), &env);

    assert_eq!(state.in_flight, 0);
    assert_eq!(
        state.view_model().mutation_error.as_deref(),
        Some("Mutation rejected: permission denied")
    );
    assert_eq!(state.todos, vec![item], "list unchanged on rejection");

    let _ = reducer.reduce(&mut state, TodoListAction::DismissError, &env);
    assert!(state.last_mutation_error.is_none());
}

#[test]
fn commit_clears_previous_error() {
    let mut state = ready(vec![]);
    state.last_mutation_error = Some("boom".into());
    state.in_flight = 1;

    ReducerTest::new(TodoListReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TodoListAction::MutationCommitted {
            ticket: T1,
            intent: Intent::Add,
            operations: 1,
        })
        .then_state(|state| {
            assert!(state.last_mutation_error.is_none());
            assert_eq!(state.in_flight, 0);
        })
        .run();
}

#[test]
fn transactor_is_object_safe() {
    let transactor: Arc<dyn Transactor> = Arc::new(RecordingTransactor::new());
    let _env = TodoListEnvironment::new(Arc::new(test_clock()), transactor);
}
