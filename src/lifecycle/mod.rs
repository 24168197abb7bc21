//! State-machine glue between the transport layer and the hub.
//!
//! The transport invokes one method per event (connect, inbound message,
//! graceful close, transport error); each drives the registry first and
//! defers any fan-out to the notifier's worker pool. The one rule that
//! matters for correctness: membership mutations happen on the callback
//! thread, announcements happen later with totals computed at fan-out time.

mod notifier;

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::broadcast::{Broadcaster, BroadcastStatsSnapshot};
use crate::metrics::SessionMetrics;
use crate::registry::{RegistryStats, SessionRegistry};
use crate::session::SessionHandle;

pub use notifier::{Notice, Notifier};

pub struct LifecycleCoordinator {
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<Broadcaster>,
    notifier: Notifier,
}

impl LifecycleCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        broadcaster: Arc<Broadcaster>,
        queue_depth: usize,
        worker_count: usize,
        shutdown: &broadcast::Sender<()>,
    ) -> Self {
        let notifier = Notifier::start(
            registry.clone(),
            broadcaster.clone(),
            queue_depth,
            worker_count,
            shutdown,
        );
        Self {
            registry,
            broadcaster,
            notifier,
        }
    }

    /// Connection established: register the session under both keys, greet
    /// it directly, and queue the join announcement for everyone else.
    pub fn on_connect(&self, session: Arc<SessionHandle>) {
        self.registry.insert(session.clone());

        tracing::info!(
            session_id = %session.id(),
            alias = session.alias().unwrap_or("-"),
            "Client connected"
        );

        // Welcome goes to the new session only, never through the fan-out
        // path. The guarded send treats a failure like any other dead peer
        // and evicts the session straight away.
        let welcome = format!("Connected successfully! ID: {}", session.id());
        self.broadcaster.unicast(session.id(), &welcome);

        self.notifier.enqueue(Notice::Joined {
            exclude: session.id().to_owned(),
        });
    }

    /// Inbound chat: tag with a short sender prefix and relay to everyone
    /// except the sender.
    pub fn on_message(&self, session: &SessionHandle, body: &str) {
        SessionMetrics::record_message_received();
        tracing::debug!(session_id = %session.id(), len = body.len(), "Message received");

        self.notifier.enqueue(Notice::Chat {
            text: format!("[{}]: {}", session.short_tag(), body),
            exclude: session.id().to_owned(),
        });
    }

    /// Graceful close: the session leaves the registry before the departure
    /// announcement is queued, so it is never counted in (or sent) its own
    /// goodbye.
    pub fn on_disconnect(&self, session_id: &str) {
        if self.registry.remove(session_id).is_some() {
            tracing::info!(session_id = %session_id, "Client disconnected");
            self.notifier.enqueue(Notice::Left);
        }
    }

    /// Transport error: remove only. Errors are not delivery-safe events, so
    /// no announcement is issued.
    pub fn on_error(&self, session_id: &str) {
        if self.registry.remove(session_id).is_some() {
            tracing::warn!(session_id = %session_id, "Session removed after transport error");
        }
    }

    /// Direct push used by the upload workflow: `key` may be a transport id
    /// or an alias. Failure evicts the target and comes back as `false`.
    pub fn send_to_client(&self, key: &str, text: &str) -> bool {
        self.broadcaster.unicast(key, text)
    }

    /// Deduplicated live-session count (prunes closed entries).
    pub fn connected_count(&self) -> usize {
        self.registry.live_count()
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn delivery_stats(&self) -> BroadcastStatsSnapshot {
        self.broadcaster.stats()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Wait for the notifier workers after the shutdown signal has fired.
    pub async fn join_notifier(&self) {
        self.notifier.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OutboundFrame;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    // The shutdown sender must stay alive: a closed channel reads as the
    // shutdown signal and stops the workers.
    fn hub() -> (Arc<SessionRegistry>, LifecycleCoordinator, broadcast::Sender<()>) {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));
        let (shutdown_tx, _) = broadcast::channel(1);
        let coordinator =
            LifecycleCoordinator::new(registry.clone(), broadcaster, 16, 2, &shutdown_tx);
        (registry, coordinator, shutdown_tx)
    }

    fn session(id: &str, alias: Option<&str>) -> (Arc<SessionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Arc::new(SessionHandle::new(id, alias.map(str::to_owned), tx)),
            rx,
        )
    }

    async fn next_text(rx: &mut mpsc::Receiver<OutboundFrame>) -> String {
        match timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(OutboundFrame::Text(t))) => t,
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    /// Drain frames until `expected` arrives. Join/leave notices queued
    /// before the call fan out in no guaranteed order relative to each
    /// other, so positional assertions on them are not sound.
    async fn recv_until(rx: &mut mpsc::Receiver<OutboundFrame>, expected: &str) {
        loop {
            if next_text(rx).await == expected {
                return;
            }
        }
    }

    /// Let the workers settle, then check that nothing containing `needle`
    /// was delivered.
    async fn assert_never_received(rx: &mut mpsc::Receiver<OutboundFrame>, needle: &str) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        while let Ok(frame) = rx.try_recv() {
            if let OutboundFrame::Text(text) = frame {
                assert!(!text.contains(needle), "unexpected frame: {text}");
            }
        }
    }

    #[tokio::test]
    async fn connect_greets_the_new_session_directly() {
        let (_registry, coordinator, _shutdown) = hub();
        let (a, mut rx) = session("session-a", None);
        coordinator.on_connect(a);

        let greeting = next_text(&mut rx).await;
        assert_eq!(greeting, "Connected successfully! ID: session-a");
    }

    #[tokio::test]
    async fn connect_announces_to_others_but_not_the_newcomer() {
        let (_registry, coordinator, _shutdown) = hub();
        let (a, mut a_rx) = session("session-a", None);
        let (b, mut b_rx) = session("session-b", None);

        coordinator.on_connect(a);
        assert_eq!(
            next_text(&mut a_rx).await,
            "Connected successfully! ID: session-a"
        );

        coordinator.on_connect(b);
        assert_eq!(
            next_text(&mut b_rx).await,
            "Connected successfully! ID: session-b"
        );

        // A sees B's arrival with the post-connect total.
        assert_eq!(
            next_text(&mut a_rx).await,
            "A new client connected. Total: 2"
        );
    }

    #[tokio::test]
    async fn chat_is_tagged_and_skips_the_sender() {
        let (_registry, coordinator, _shutdown) = hub();
        let (a, mut a_rx) = session("aaaaaaaa1111", None);
        let (b, mut b_rx) = session("bbbbbbbb2222", None);
        coordinator.on_connect(a.clone());
        coordinator.on_connect(b);

        coordinator.on_message(&a, "hello there");

        // B may see A's late join announcement first; the chat must arrive
        // and the sender must never see its own message echoed back.
        recv_until(&mut b_rx, "[aaaaaaaa]: hello there").await;
        assert_never_received(&mut a_rx, "hello there").await;
    }

    #[tokio::test]
    async fn departure_total_excludes_the_leaver() {
        let (registry, coordinator, _shutdown) = hub();
        let (a, mut a_rx) = session("session-a", None);
        let (b, mut b_rx) = session("session-b", None);
        coordinator.on_connect(a);
        coordinator.on_connect(b);

        coordinator.on_disconnect("session-a");
        assert!(registry.get("session-a").is_none());

        // A is already gone when the total is taken, whatever join notices
        // are still in flight.
        recv_until(&mut b_rx, "A client disconnected. Total: 1").await;
        assert_never_received(&mut a_rx, "disconnected").await;
    }

    #[tokio::test]
    async fn transport_error_removes_without_announcing() {
        let (registry, coordinator, _shutdown) = hub();
        let (a, mut a_rx) = session("session-a", Some("app-1"));
        let (b, mut b_rx) = session("session-b", None);
        coordinator.on_connect(a);
        coordinator.on_connect(b);

        coordinator.on_error("session-a");
        assert!(registry.get("session-a").is_none());
        assert!(registry.get("app-1").is_none());

        // No departure notice for an errored session, on either side.
        assert_never_received(&mut b_rx, "disconnected").await;
        assert_never_received(&mut a_rx, "disconnected").await;
    }

    #[tokio::test]
    async fn send_to_client_resolves_either_key() {
        let (_registry, coordinator, _shutdown) = hub();
        let (a, mut a_rx) = session("t1", Some("app-42"));
        coordinator.on_connect(a);
        next_text(&mut a_rx).await; // welcome

        assert!(coordinator.send_to_client("app-42", "decoded: X"));
        assert!(coordinator.send_to_client("t1", "decoded: Y"));
        assert_eq!(next_text(&mut a_rx).await, "decoded: X");
        assert_eq!(next_text(&mut a_rx).await, "decoded: Y");
    }

    #[tokio::test]
    async fn send_to_unknown_client_reports_not_delivered() {
        let (_registry, coordinator, _shutdown) = hub();
        assert!(!coordinator.send_to_client("nobody", "x"));
    }

    #[tokio::test]
    async fn undeliverable_welcome_evicts_the_session() {
        let (registry, coordinator, _shutdown) = hub();
        let (tx, _rx) = mpsc::channel(1);
        let stalled = Arc::new(SessionHandle::new("stalled-1", None, tx));
        // Fill the only outbound slot so the welcome hits a full buffer.
        stalled.send("pad").unwrap();

        coordinator.on_connect(stalled);

        assert!(registry.get("stalled-1").is_none());
        assert_eq!(coordinator.connected_count(), 0);
    }

    #[tokio::test]
    async fn connected_count_dedups_aliases() {
        let (_registry, coordinator, _shutdown) = hub();
        let (a, _a_rx) = session("t1", Some("app-1"));
        let (b, _b_rx) = session("t2", None);
        coordinator.on_connect(a);
        coordinator.on_connect(b);

        assert_eq!(coordinator.connected_count(), 2);
        assert_eq!(coordinator.connected_count(), 2);
    }
}
