//! Graceful shutdown handling for the relay service.
//!
//! Coordinated teardown:
//! 1. Signal the notifier workers so no new fan-out work is accepted
//! 2. Send a farewell to every still-open session and ask it to close
//! 3. Wait (bounded) for the notifier workers to finish

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::lifecycle::LifecycleCoordinator;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for the notifier workers to stop (default: 5 seconds)
    pub worker_join_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            worker_join_timeout: Duration::from_secs(5),
        }
    }
}

/// Handles graceful shutdown of the relay service
pub struct GracefulShutdown {
    coordinator: Arc<LifecycleCoordinator>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(coordinator: Arc<LifecycleCoordinator>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            coordinator,
            shutdown_tx,
            config: ShutdownConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(
        coordinator: Arc<LifecycleCoordinator>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            coordinator,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(live_sessions = self.coordinator.connected_count())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        // Phase 1: stop accepting fan-out work
        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Stopping notifier");
        let _ = self.shutdown_tx.send(());

        // Phase 2: farewell and close every still-open session. Sends are
        // fail-fast; a stalled peer cannot hold teardown hostage.
        tracing::info!("Phase 2: Closing sessions");
        let farewell = format!("Server shutting down: {}", reason);
        for session in self.coordinator.registry().drain() {
            if !session.is_open() {
                continue;
            }
            if session.send(farewell.clone()).is_ok() {
                result.clients_notified += 1;
            }
            if session.request_close() {
                result.sessions_closed += 1;
            }
        }

        // Phase 3: wait for in-flight fan-out to finish
        tracing::info!("Phase 3: Joining notifier workers");
        result.workers_joined = timeout(
            self.config.worker_join_timeout,
            self.coordinator.join_notifier(),
        )
        .await
        .is_ok();

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            clients_notified = result.clients_notified,
            sessions_closed = result.sessions_closed,
            workers_joined = result.workers_joined,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether shutdown completed successfully
    pub success: bool,
    /// Number of clients that received the farewell message
    pub clients_notified: usize,
    /// Number of sessions asked to close
    pub sessions_closed: usize,
    /// Whether the notifier workers stopped within the timeout
    pub workers_joined: bool,
    /// Total time taken for shutdown
    pub duration: Duration,
}
