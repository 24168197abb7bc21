// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;

// Hub layer (registry and broadcast core)
pub mod broadcast;
pub mod lifecycle;
pub mod registry;
pub mod session;

// Application layer
pub mod api;
pub mod detector;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
