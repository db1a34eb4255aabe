//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the client components:
//! - Live subscription (snapshots, errors, reconnects)
//! - Mutation dispatch (batches sent, rejections, batch sizes)
//! - Reducer execution and effect handling (recorded by the [`Store`](crate::Store))
//!
//! # Example
//!
//! ```rust,no_run
//! use shared_todos_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use shared_todos_core::batch::Intent;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the HTTP endpoint listens on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Install the global recorder and start serving `/metrics`.
    ///
    /// Must be called from within a Tokio runtime; the HTTP exporter runs
    /// as a background task.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or the recorder
    /// cannot be installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), the
    /// second server keeps no handle and serves nothing; this is logged
    /// and not treated as an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        // Register all metric descriptions
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            // Configure histogram buckets for latency measurements
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ],
            )
            .and_then(|builder| {
                builder.set_buckets_for_metric(
                    Matcher::Full("todos.mutations.operations".to_string()),
                    &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0],
                )
            })
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();

        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(async move {
                    if exporter.await.is_err() {
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Subscription
    describe_counter!(
        "todos.subscription.snapshots",
        "Total number of snapshots received from the live subscription"
    );
    describe_counter!(
        "todos.subscription.errors",
        "Total number of subscription failures"
    );
    describe_counter!(
        "todos.subscription.reconnects",
        "Total number of subscription re-establishment attempts"
    );

    // Mutations
    describe_counter!(
        "todos.mutations.dispatched",
        "Total number of batches accepted by the store, by intent"
    );
    describe_counter!(
        "todos.mutations.rejected",
        "Total number of batches rejected or undeliverable, by intent"
    );
    describe_histogram!(
        "todos.mutations.operations",
        "Number of operations per dispatched batch"
    );
    describe_histogram!(
        "todos.mutations.duration_seconds",
        "Time from dispatch to store acknowledgement"
    );

    // Store
    describe_counter!("store.actions.total", "Total number of actions reduced");
    describe_counter!(
        "store.effects.executed",
        "Total number of effects started, by type"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time taken by a single reducer call"
    );
}

/// Live subscription metrics recorder.
pub struct SubscriptionMetrics;

impl SubscriptionMetrics {
    /// Record a snapshot delivered by the store.
    pub fn record_snapshot(len: usize) {
        counter!("todos.subscription.snapshots").increment(1);
        gauge!("todos.subscription.snapshot_size").set(len as f64);
    }

    /// Record a subscription failure.
    pub fn record_error() {
        counter!("todos.subscription.errors").increment(1);
    }

    /// Record a reconnect attempt.
    pub fn record_reconnect() {
        counter!("todos.subscription.reconnects").increment(1);
    }
}

/// Mutation dispatch metrics recorder.
pub struct MutationMetrics;

impl MutationMetrics {
    /// Record a batch accepted by the store.
    pub fn record_dispatched(intent: Intent, operations: usize, duration: Duration) {
        counter!("todos.mutations.dispatched", "intent" => intent.as_str()).increment(1);
        histogram!("todos.mutations.operations").record(operations as f64);
        histogram!("todos.mutations.duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a batch the store did not apply.
    pub fn record_rejected(intent: Intent) {
        counter!("todos.mutations.rejected", "intent" => intent.as_str()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        SubscriptionMetrics::record_snapshot(3);
        SubscriptionMetrics::record_error();
        SubscriptionMetrics::record_reconnect();
        MutationMetrics::record_dispatched(Intent::ToggleAll, 3, Duration::from_millis(5));
        MutationMetrics::record_rejected(Intent::Add);

        // If this test runs after another test initialized the recorder,
        // handle might be None. That's OK - metrics are still being recorded.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("todos_subscription_snapshots"));
            assert!(rendered.contains("todos_subscription_errors"));
            assert!(rendered.contains("todos_mutations_dispatched"));
            assert!(rendered.contains("intent=\"toggle_all\""));
            assert!(rendered.contains("todos_mutations_rejected"));
        }
    }
}
