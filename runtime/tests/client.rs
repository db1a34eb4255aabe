//! End-to-end tests: clients sharing one in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use shared_todos_core::batch::{DispatchOutcome, MutationError};
use shared_todos_core::remote::RemoteError;
use shared_todos_core::todo::{Color, Deadline, TodoPatch};
use shared_todos_core::view::LoadState;
use shared_todos_runtime::{ClientConfig, ClientError, StoreError, TodoClient};
use shared_todos_testing::helpers::{done_todo, todo};
use shared_todos_testing::{InMemoryRemote, SequentialIds, init_test_tracing};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn config() -> ClientConfig {
    ClientConfig::new("test")
        .with_retry_initial_delay(Duration::from_millis(5))
        .with_retry_max_delay(Duration::from_millis(20))
        .with_mutation_timeout(Duration::from_secs(2))
        .with_shutdown_timeout(Duration::from_secs(1))
}

async fn client(remote: &InMemoryRemote) -> TodoClient {
    TodoClient::init(config(), Arc::new(remote.clone())).await.unwrap()
}

async fn ready(client: &TodoClient) {
    client
        .wait_for(WAIT, |model| model.loading_state.is_ready())
        .await
        .unwrap();
}

#[tokio::test]
async fn view_starts_loading_then_shows_the_snapshot() {
    init_test_tracing();
    let remote = InMemoryRemote::with_todos(vec![todo("a"), done_todo("b")]);
    let client = client(&remote).await;

    let initial = client.view();
    assert_eq!(initial.loading_state, LoadState::Loading);
    assert!(initial.grouped_todos.is_empty());

    let model = client
        .wait_for(WAIT, |model| model.loading_state.is_ready())
        .await
        .unwrap();
    assert_eq!(model.grouped_todos.len(), 2);
    assert_eq!(model.remaining_count, 1);
    assert!(model.toggle_all_target);
}

#[tokio::test]
async fn added_todo_round_trips_with_exact_values() {
    let remote = InMemoryRemote::new();
    let client = TodoClient::init_with_ids(
        config(),
        Arc::new(remote.clone()),
        Arc::new(SequentialIds::new()),
    )
    .await
    .unwrap();
    ready(&client).await;

    let deadline = Deadline::from_ymd(2024, 1, 1);
    let id = client
        .add("Buy milk", Some(Color::LightGreen), deadline)
        .await
        .unwrap();
    assert_eq!(id, SequentialIds::nth(1));

    let model = client
        .wait_for(WAIT, |model| model.grouped_todos.len() == 1)
        .await
        .unwrap();
    let stored = &model.grouped_todos.with_deadline[0];
    assert_eq!(stored.id, id);
    assert_eq!(stored.text, "Buy milk");
    assert_eq!(stored.color.hex(), "#BAFFC9");
    assert_eq!(stored.deadline, deadline);
    assert!(!stored.done);
}

#[tokio::test]
async fn two_clients_converge() {
    let remote = InMemoryRemote::new();
    let alice = client(&remote).await;
    let bob = client(&remote).await;
    ready(&alice).await;
    ready(&bob).await;

    alice.add("Buy milk", None, None).await.unwrap();
    alice.add("Walk dog", None, None).await.unwrap();

    let model = bob
        .wait_for(WAIT, |model| model.remaining_count == 2)
        .await
        .unwrap();
    assert_eq!(model.grouped_todos.without_deadline.len(), 2);

    assert_eq!(
        bob.toggle_all().await.unwrap(),
        DispatchOutcome::Committed { operations: 2 }
    );
    alice
        .wait_for(WAIT, |model| {
            model.remaining_count == 0 && !model.toggle_all_target
        })
        .await
        .unwrap();

    alice.delete_completed().await.unwrap();
    bob.wait_for(WAIT, |model| model.grouped_todos.is_empty())
        .await
        .unwrap();
    assert!(remote.snapshot().is_empty());
}

#[tokio::test]
async fn intents_do_not_change_the_list_before_the_snapshot() {
    let remote = InMemoryRemote::new();
    let client = client(&remote).await;
    ready(&client).await;

    // Hold the snapshot back by failing the write
    remote.reject_next_transact(RemoteError::Rejected("quota exceeded".into()));
    let result = client.add("never shown", None, None).await;

    assert!(matches!(
        result,
        Err(ClientError::Mutation(MutationError::Rejected { .. }))
    ));
    assert!(client.todos().await.is_empty());
    assert!(client.view().grouped_todos.is_empty());
}

#[tokio::test]
async fn rejection_is_shown_until_dismissed() {
    let remote = InMemoryRemote::with_todos(vec![todo("a")]);
    let client = client(&remote).await;
    ready(&client).await;

    remote.reject_next_transact(RemoteError::Rejected("permission denied".into()));
    let id = client.todos().await[0].id.clone();
    assert!(client.delete(id).await.is_err());

    let error = client.view().mutation_error.unwrap();
    assert!(error.contains("permission denied"), "{error}");

    client.dismiss_error().await.unwrap();
    assert_eq!(client.view().mutation_error, None);
}

#[tokio::test]
async fn toggle_and_update_reach_every_client() {
    let remote = InMemoryRemote::with_todos(vec![todo("a")]);
    let alice = client(&remote).await;
    let bob = client(&remote).await;
    ready(&alice).await;
    ready(&bob).await;
    let id = alice.todos().await[0].id.clone();

    alice.toggle_done(id.clone()).await.unwrap();
    bob.wait_for(WAIT, |model| model.remaining_count == 0)
        .await
        .unwrap();

    let deadline = Deadline::from_ymd(2030, 6, 1);
    alice
        .update(id.clone(), TodoPatch::deadline(deadline))
        .await
        .unwrap();
    let model = bob
        .wait_for(WAIT, |model| model.grouped_todos.with_deadline.len() == 1)
        .await
        .unwrap();
    assert_eq!(model.grouped_todos.with_deadline[0].deadline, deadline);
    assert!(remote.snapshot()[0].done);
}

#[tokio::test]
async fn toggle_done_of_unknown_todo_is_skipped() {
    let remote = InMemoryRemote::new();
    let client = client(&remote).await;
    ready(&client).await;

    let outcome = client
        .toggle_done(shared_todos_core::todo::TodoId::new())
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Skipped);
    assert!(remote.transactions().is_empty());
}

#[tokio::test]
async fn subscription_failure_shows_error_without_stale_list() {
    let remote = InMemoryRemote::with_todos(vec![todo("a")]);
    let client = client(&remote).await;
    ready(&client).await;

    // Keep the store unreachable for a couple of reconnects
    remote.fail_next_subscribe(RemoteError::Unavailable("offline".into()));
    remote.fail_next_subscribe(RemoteError::Unavailable("offline".into()));
    remote.break_streams(RemoteError::Unavailable("offline".into()));

    let failed = client
        .wait_for(WAIT, |model| matches!(model.loading_state, LoadState::Error { .. }))
        .await
        .unwrap();
    assert!(failed.grouped_todos.is_empty());
    assert_eq!(failed.remaining_count, 0);
    assert!(failed.error_message.unwrap().contains("offline"));

    let recovered = client
        .wait_for(WAIT, |model| model.loading_state.is_ready())
        .await
        .unwrap();
    assert_eq!(recovered.grouped_todos.len(), 1);
}

#[tokio::test]
async fn reconnect_never_returns_to_loading() {
    let remote = InMemoryRemote::with_todos(vec![todo("a")]);
    let client = client(&remote).await;
    ready(&client).await;

    let mut models = client.watch();
    models.mark_unchanged();
    remote.fail_next_subscribe(RemoteError::Unavailable("offline".into()));
    remote.break_streams(RemoteError::Unavailable("offline".into()));

    let mut seen = Vec::new();
    tokio::time::timeout(WAIT, async {
        loop {
            models.changed().await.unwrap();
            let state = models.borrow_and_update().loading_state.clone();
            let recovered = state.is_ready()
                && seen.iter().any(|s| matches!(s, LoadState::Error { .. }));
            seen.push(state);
            if recovered {
                break;
            }
        }
    })
    .await
    .unwrap();

    assert!(
        seen.iter().all(|state| *state != LoadState::Loading),
        "{seen:?}"
    );
    assert!(seen.iter().any(|state| matches!(state, LoadState::Error { .. })));
}

#[tokio::test]
async fn shutdown_releases_the_subscription() {
    let remote = InMemoryRemote::new();
    let client = client(&remote).await;
    ready(&client).await;
    assert_eq!(remote.active_subscriptions(), 1);

    client.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(remote.active_subscriptions(), 0);
}

#[tokio::test]
async fn invalid_configuration_is_refused() {
    let remote = InMemoryRemote::new();
    let result = TodoClient::init(
        config().with_retry_multiplier(0.0),
        Arc::new(remote),
    )
    .await;
    assert!(matches!(result, Err(ClientError::Config(_))));
}

#[tokio::test]
async fn wait_for_times_out() {
    let remote = InMemoryRemote::new();
    let client = client(&remote).await;

    let result = client
        .wait_for(Duration::from_millis(20), |model| model.remaining_count == 42)
        .await;
    assert!(matches!(result, Err(ClientError::Store(StoreError::Timeout))));
}
