//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::broadcast::BroadcastStatsSnapshot;
use crate::registry::RegistryStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub sessions: RegistryStats,
    pub detector: DetectorHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct DetectorHealthResponse {
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub sessions: RegistryStats,
    pub delivery: BroadcastStatsSnapshot,
}

/// GET /health - Service health summary
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        sessions: state.coordinator.registry_stats(),
        detector: DetectorHealthResponse {
            backend: state.detector.name().to_string(),
        },
    })
}

/// GET /stats - Registry and delivery statistics
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        sessions: state.coordinator.registry_stats(),
        delivery: state.coordinator.delivery_stats(),
    })
}

/// GET /status - Plain-text connected-client count for the status page
pub async fn status(State(state): State<AppState>) -> String {
    format!(
        "WebSocket server running. Connected clients: {}",
        state.coordinator.connected_count()
    )
}
