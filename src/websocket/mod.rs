//! Axum WebSocket transport adapter.
//!
//! Translates socket events into the lifecycle coordinator's vocabulary:
//! one write pump per connection drains the session's outbound channel, one
//! read pump feeds inbound frames, and the way the connection ends decides
//! whether the hub sees a disconnect or a transport error.

mod handler;

pub use handler::{ws_handler, WsQuery};
