use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats, status};
use super::metrics::prometheus_metrics;
use super::photo::{process_photo, process_photo_for_client};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Photo upload endpoints
        .nest(
            "/api",
            Router::new()
                .route("/photo", post(process_photo))
                .route("/photo/{id}", post(process_photo_for_client)),
        )
}
