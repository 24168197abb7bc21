//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod photo;
mod routes;

// Re-export all handlers for use in server/app.rs
pub use health::{health, stats, status, HealthResponse, StatsResponse};
pub use metrics::prometheus_metrics;
pub use photo::{process_photo, process_photo_for_client, PhotoResponse};
pub use routes::api_routes;
