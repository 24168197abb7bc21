//! Session handle shared between the transport layer and the hub.
//!
//! The transport owns the underlying connection and is the only writer of a
//! session's open state; the hub holds non-owning `Arc` references used to
//! observe state and attempt sends. Outbound frames go through a bounded
//! channel drained by a single write pump per socket, which serializes all
//! writes to one peer while leaving unrelated sessions free to proceed.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Number of leading transport-id characters used to tag relayed chat.
const SHORT_TAG_LEN: usize = 8;

/// Frame queued for a session's write pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Text payload delivered to the peer as-is.
    Text(String),
    /// Request that the transport close the connection.
    Close,
}

/// Why a guarded send did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSendError {
    /// The peer's outbound buffer is full (slow or stalled consumer).
    Backpressure,
    /// The transport side of the session is gone.
    Closed,
}

impl std::fmt::Display for SessionSendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backpressure => write!(f, "outbound buffer full"),
            Self::Closed => write!(f, "session closed"),
        }
    }
}

/// Handle for a single live bidirectional connection.
pub struct SessionHandle {
    id: String,
    alias: Option<String>,
    sender: mpsc::Sender<OutboundFrame>,
    open: AtomicBool,
    connected_at: DateTime<Utc>,
}

impl SessionHandle {
    pub fn new(
        id: impl Into<String>,
        alias: Option<String>,
        sender: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            id: id.into(),
            alias,
            sender,
            open: AtomicBool::new(true),
            connected_at: Utc::now(),
        }
    }

    /// Transport-assigned identifier, unique and immutable for the session.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Client-supplied logical identifier, if one was given at connect time.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Short prefix of the transport id, used as the sender tag on relayed
    /// chat messages.
    pub fn short_tag(&self) -> &str {
        self.id.get(..SHORT_TAG_LEN).unwrap_or(&self.id)
    }

    /// Whether `key` addresses this session (transport id or alias).
    pub fn is_identified_by(&self, key: &str) -> bool {
        self.id == key || self.alias.as_deref() == Some(key)
    }

    /// A session is open until the transport marks it closed or its write
    /// pump goes away.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed) && !self.sender.is_closed()
    }

    /// Called by the transport when the underlying connection is gone.
    /// Terminal; the hub never sets this.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    /// Guarded fail-fast send. Never blocks: a full outbound buffer is
    /// reported as `Backpressure` rather than awaited, so callers on
    /// request-handling threads are never stalled by a slow peer.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SessionSendError> {
        if !self.is_open() {
            return Err(SessionSendError::Closed);
        }
        self.sender
            .try_send(OutboundFrame::Text(text.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SessionSendError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => SessionSendError::Closed,
            })
    }

    /// Ask the write pump to close the socket. Best effort; the transport
    /// remains the one that actually closes and flips the open state.
    pub fn request_close(&self) -> bool {
        self.sender.try_send(OutboundFrame::Close).is_ok()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn session_with_buffer(n: usize) -> (SessionHandle, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(n);
        (SessionHandle::new("abcdef123456", None, tx), rx)
    }

    #[tokio::test]
    async fn send_queues_text_frame() {
        let (session, mut rx) = session_with_buffer(4);
        assert_ok!(session.send("hello"));
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("hello".into())));
    }

    #[tokio::test]
    async fn send_fails_fast_on_full_buffer() {
        let (session, _rx) = session_with_buffer(1);
        assert_ok!(session.send("first"));
        assert_eq!(session.send("second"), Err(SessionSendError::Backpressure));
    }

    #[tokio::test]
    async fn send_fails_when_pump_is_gone() {
        let (session, rx) = session_with_buffer(4);
        drop(rx);
        assert_eq!(session.send("hello"), Err(SessionSendError::Closed));
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn mark_closed_is_terminal() {
        let (session, _rx) = session_with_buffer(4);
        assert!(session.is_open());
        session.mark_closed();
        assert!(!session.is_open());
        assert_eq!(session.send("late"), Err(SessionSendError::Closed));
    }

    #[test]
    fn short_tag_truncates_long_ids() {
        let (tx, _rx) = mpsc::channel(1);
        let session = SessionHandle::new("0123456789abcdef", None, tx);
        assert_eq!(session.short_tag(), "01234567");
    }

    #[test]
    fn short_tag_keeps_short_ids_whole() {
        let (tx, _rx) = mpsc::channel(1);
        let session = SessionHandle::new("t1", None, tx);
        assert_eq!(session.short_tag(), "t1");
    }

    #[test]
    fn identified_by_either_key() {
        let (tx, _rx) = mpsc::channel(1);
        let session = SessionHandle::new("t1", Some("app-42".into()), tx);
        assert!(session.is_identified_by("t1"));
        assert!(session.is_identified_by("app-42"));
        assert!(!session.is_identified_by("other"));
    }

    #[tokio::test]
    async fn request_close_enqueues_close_frame() {
        let (session, mut rx) = session_with_buffer(2);
        assert!(session.request_close());
        assert_eq!(rx.recv().await, Some(OutboundFrame::Close));
    }
}
