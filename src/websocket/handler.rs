use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::metrics::SessionMetrics;
use crate::server::AppState;
use crate::session::{OutboundFrame, SessionHandle};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Optional client-supplied logical identifier, used as an alias when
    /// addressing this client from the upload workflow.
    pub socketid: Option<String>,
}

/// How the connection ended, for bookkeeping purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseKind {
    /// Peer closed (close frame or clean end of stream).
    Graceful,
    /// Transport-level failure on either pump.
    Errored,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query),
    fields(has_socket_id = query.socketid.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    // A missing or empty socketid is not an error; the session is simply
    // only addressable by its transport id.
    let alias = query.socketid.filter(|id| !id.is_empty());
    ws.on_upgrade(move |socket| handle_socket(socket, state, alias))
}

async fn handle_socket(socket: WebSocket, state: AppState, alias: Option<String>) {
    let session_id = Uuid::new_v4().to_string();
    let connection_start = Instant::now();

    let (frame_tx, mut frame_rx) = mpsc::channel(state.settings.hub.session_buffer);
    let session = Arc::new(SessionHandle::new(session_id.clone(), alias, frame_tx));

    SessionMetrics::record_opened();
    state.coordinator.on_connect(session.clone());

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Write pump: the only task that touches the sink, so all sends to this
    // peer are serialized. Returns false on a sink failure.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        return false;
                    }
                }
                OutboundFrame::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return true;
                }
            }
        }
        true
    });

    // Read pump: feeds inbound frames to the coordinator until the peer
    // goes away, and classifies how it went away.
    let coordinator = state.coordinator.clone();
    let read_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    coordinator.on_message(&read_session, text.as_str());
                }
                Ok(Message::Close(_)) => return CloseKind::Graceful,
                Ok(Message::Binary(_)) => {
                    tracing::debug!(
                        session_id = %read_session.id(),
                        "Ignoring binary frame"
                    );
                }
                // Axum answers pings itself.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    tracing::warn!(
                        session_id = %read_session.id(),
                        error = %e,
                        "WebSocket receive error"
                    );
                    return CloseKind::Errored;
                }
            }
        }
        CloseKind::Graceful
    });

    let close_kind = tokio::select! {
        kind = &mut recv_task => {
            send_task.abort();
            kind.unwrap_or(CloseKind::Errored)
        }
        clean = &mut send_task => {
            recv_task.abort();
            if clean.unwrap_or(false) {
                CloseKind::Graceful
            } else {
                CloseKind::Errored
            }
        }
    };

    session.mark_closed();
    match close_kind {
        CloseKind::Graceful => state.coordinator.on_disconnect(&session_id),
        CloseKind::Errored => state.coordinator.on_error(&session_id),
    }

    let duration = connection_start.elapsed().as_secs_f64();
    SessionMetrics::record_closed(duration);
    tracing::info!(
        session_id = %session_id,
        ?close_kind,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}
