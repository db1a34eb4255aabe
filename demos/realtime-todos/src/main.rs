//! Realtime todos demo
//!
//! Two clients share one in-memory store. Every write made by one of them
//! shows up in the other's view through the live subscription.

use anyhow::Context;
use shared_todos_core::todo::{Color, Deadline, TodoPatch};
use shared_todos_core::view::{LoadState, TodoViewModel};
use shared_todos_runtime::{ClientConfig, TodoClient};
use shared_todos_testing::InMemoryRemote;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const WAIT: Duration = Duration::from_secs(2);

fn render(who: &str, model: &TodoViewModel) {
    match &model.loading_state {
        LoadState::Loading => println!("[{who}] Loading..."),
        LoadState::Error { message } => println!("[{who}] Error: {message}"),
        LoadState::Ready => {
            println!("[{who}] {} remaining", model.remaining_count);
            for todo in &model.grouped_todos.with_deadline {
                let due = todo.deadline.map(|d| d.to_string()).unwrap_or_default();
                let mark = if todo.done { 'x' } else { ' ' };
                println!("  [{mark}] {} (due {due}, {})", todo.text, todo.color);
            }
            for todo in &model.grouped_todos.without_deadline {
                let mark = if todo.done { 'x' } else { ' ' };
                println!("  [{mark}] {} ({})", todo.text, todo.color);
            }
            if let Some(error) = &model.mutation_error {
                println!("  ! {error}");
            }
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realtime_todos=info,shared_todos_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Realtime Todos: two clients, one shared list ===\n");

    let config = ClientConfig::from_env().context("invalid configuration")?;
    let remote = InMemoryRemote::new();

    let alice = TodoClient::init(config.clone(), Arc::new(remote.clone())).await?;
    // Only the first client exports metrics
    let bob_config = ClientConfig {
        metrics_addr: None,
        ..config
    };
    let bob = TodoClient::init(bob_config, Arc::new(remote.clone())).await?;

    render("bob", &bob.view());
    bob.wait_for(WAIT, |m| m.loading_state.is_ready()).await?;
    alice.wait_for(WAIT, |m| m.loading_state.is_ready()).await?;

    println!("\n>>> alice adds three todos");
    alice
        .add(
            "Buy milk",
            Some(Color::LightGreen),
            Deadline::from_ymd(2024, 1, 1),
        )
        .await?;
    alice.add("Walk the dog", None, None).await?;
    let taxes = alice
        .add("File taxes", Some(Color::LightPink), Deadline::from_ymd(2023, 12, 15))
        .await?;

    let model = bob.wait_for(WAIT, |m| m.grouped_todos.len() == 3).await?;
    render("bob", &model);

    println!("\n>>> bob completes \"File taxes\" and moves its deadline");
    bob.toggle_done(taxes.clone()).await?;
    bob.update(taxes, TodoPatch::deadline(Deadline::from_ymd(2024, 4, 15)))
        .await?;
    let model = alice.wait_for(WAIT, |m| m.remaining_count == 2).await?;
    render("alice", &model);

    println!("\n>>> alice toggles all");
    alice.toggle_all().await?;
    let model = bob.wait_for(WAIT, |m| m.remaining_count == 0).await?;
    render("bob", &model);

    println!("\n>>> bob deletes completed todos");
    bob.delete_completed().await?;
    let model = alice.wait_for(WAIT, |m| m.grouped_todos.is_empty()).await?;
    render("alice", &model);

    if let Some(rendered) = alice.metrics().and_then(|server| server.render()) {
        println!("\n=== Metrics ===\n{rendered}");
    }

    alice.shutdown().await?;
    bob.shutdown().await?;

    println!("\n=== Demo complete ===");
    Ok(())
}
