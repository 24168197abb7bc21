//! Fan-out and unicast delivery.
//!
//! Every delivery pass works on a snapshot of the registry, never on the
//! live table, so concurrent connects and disconnects can only cause a
//! miss — never a crash or a torn iteration. A session reachable through
//! two keys is sent to exactly once per pass, and one peer's failure never
//! aborts delivery to the rest.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::metrics::DeliveryMetrics;
use crate::registry::SessionRegistry;
use crate::session::SessionHandle;

/// Result of one broadcast pass.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastOutcome {
    /// Distinct open sessions the pass attempted to reach.
    pub attempted: usize,
    /// Successful deliveries.
    pub delivered: usize,
}

impl BroadcastOutcome {
    pub fn failed(&self) -> usize {
        self.attempted.saturating_sub(self.delivered)
    }
}

/// Cumulative delivery counters.
#[derive(Debug, Default)]
pub struct BroadcastStats {
    broadcasts: AtomicU64,
    unicasts: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    evicted: AtomicU64,
}

impl BroadcastStats {
    pub fn snapshot(&self) -> BroadcastStatsSnapshot {
        BroadcastStatsSnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            unicasts: self.unicasts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BroadcastStats`].
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastStatsSnapshot {
    pub broadcasts: u64,
    pub unicasts: u64,
    pub delivered: u64,
    pub failed: u64,
    pub evicted: u64,
}

/// Delivers messages to all or one of the registered sessions.
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
    stats: BroadcastStats,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            stats: BroadcastStats::default(),
        }
    }

    /// Deliver `message` to every distinct open session except the one
    /// identified by `exclude` (matched against transport id and alias).
    ///
    /// Sessions added mid-pass are missed and sessions removed mid-pass may
    /// be skipped; both are acceptable for fire-and-forget notices.
    pub fn broadcast(&self, message: &str, exclude: Option<&str>) -> BroadcastOutcome {
        self.registry.prune_closed();

        let mut seen = HashSet::new();
        let targets: Vec<Arc<SessionHandle>> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|session| {
                session.is_open()
                    && !exclude.is_some_and(|key| session.is_identified_by(key))
                    && seen.insert(session.id().to_owned())
            })
            .collect();

        let mut delivered = 0;
        for session in &targets {
            if self.guarded_send(session, message) {
                delivered += 1;
            }
        }

        let outcome = BroadcastOutcome {
            attempted: targets.len(),
            delivered,
        };
        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .delivered
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
        self.stats
            .failed
            .fetch_add(outcome.failed() as u64, Ordering::Relaxed);
        DeliveryMetrics::record_broadcast(outcome.delivered as u64, outcome.failed() as u64);

        tracing::info!(
            delivered = outcome.delivered,
            attempted = outcome.attempted,
            "Broadcast pass completed"
        );
        outcome
    }

    /// Deliver `message` to exactly one session addressed by either id.
    /// A lookup miss or a failed send comes back as `false`; it is the
    /// caller's business whether that matters.
    pub fn unicast(&self, key: &str, message: &str) -> bool {
        self.stats.unicasts.fetch_add(1, Ordering::Relaxed);

        let Some(session) = self.registry.get(key) else {
            tracing::warn!(key = %key, "Unicast target not registered");
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            DeliveryMetrics::record_unicast(false);
            return false;
        };

        let ok = self.guarded_send(&session, message);
        if ok {
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, session_id = %session.id(), "Unicast delivered");
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        DeliveryMetrics::record_unicast(ok);
        ok
    }

    pub fn stats(&self) -> BroadcastStatsSnapshot {
        self.stats.snapshot()
    }

    /// Guarded single-session send. A failure (closed peer or full buffer)
    /// is treated as disconnection: the session is evicted from the
    /// registry and the send reported as failed, nothing more.
    fn guarded_send(&self, session: &Arc<SessionHandle>, message: &str) -> bool {
        match session.send(message) {
            Ok(()) => true,
            Err(reason) => {
                tracing::warn!(
                    session_id = %session.id(),
                    %reason,
                    "Send failed, evicting session"
                );
                self.registry.remove(session.id());
                self.stats.evicted.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OutboundFrame;
    use tokio::sync::mpsc;

    fn session(id: &str, alias: Option<&str>) -> (Arc<SessionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Arc::new(SessionHandle::new(id, alias.map(str::to_owned), tx)),
            rx,
        )
    }

    fn text(rx: &mut mpsc::Receiver<OutboundFrame>) -> Option<String> {
        match rx.try_recv() {
            Ok(OutboundFrame::Text(t)) => Some(t),
            _ => None,
        }
    }

    fn hub_with_sessions(
        specs: &[(&str, Option<&str>)],
    ) -> (Broadcaster, Vec<mpsc::Receiver<OutboundFrame>>) {
        let registry = Arc::new(SessionRegistry::new());
        let mut receivers = Vec::new();
        for (id, alias) in specs {
            let (s, rx) = session(id, *alias);
            registry.insert(s);
            receivers.push(rx);
        }
        (Broadcaster::new(registry), receivers)
    }

    #[test]
    fn broadcast_reaches_every_open_session() {
        let (broadcaster, mut rxs) = hub_with_sessions(&[("a", None), ("b", None), ("c", None)]);

        let outcome = broadcaster.broadcast("hi", None);
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.delivered, 3);
        for rx in rxs.iter_mut() {
            assert_eq!(text(rx).as_deref(), Some("hi"));
        }
    }

    #[test]
    fn broadcast_skips_the_excluded_session() {
        let (broadcaster, mut rxs) = hub_with_sessions(&[("a", None), ("b", None), ("c", None)]);

        broadcaster.broadcast("msg", Some("a"));
        assert!(text(&mut rxs[0]).is_none());
        assert_eq!(text(&mut rxs[1]).as_deref(), Some("msg"));
        assert_eq!(text(&mut rxs[2]).as_deref(), Some("msg"));
    }

    #[test]
    fn broadcast_exclusion_also_matches_the_alias() {
        let (broadcaster, mut rxs) = hub_with_sessions(&[("a", Some("app-1")), ("b", None)]);

        broadcaster.broadcast("msg", Some("app-1"));
        assert!(text(&mut rxs[0]).is_none());
        assert_eq!(text(&mut rxs[1]).as_deref(), Some("msg"));
    }

    #[test]
    fn aliased_session_receives_exactly_once() {
        let (broadcaster, mut rxs) = hub_with_sessions(&[("a", Some("app-1"))]);

        let outcome = broadcaster.broadcast("once", None);
        assert_eq!(outcome.attempted, 1);
        assert_eq!(text(&mut rxs[0]).as_deref(), Some("once"));
        assert!(text(&mut rxs[0]).is_none());
    }

    #[test]
    fn one_dead_peer_does_not_stop_the_pass() {
        let registry = Arc::new(SessionRegistry::new());
        let (healthy, mut healthy_rx) = session("c", None);
        let (dead, dead_rx) = session("b", None);
        registry.insert(healthy);
        registry.insert(dead.clone());
        // Peer b's write pump is gone; the pass must not let that stop
        // delivery to c.
        drop(dead_rx);
        let broadcaster = Broadcaster::new(registry.clone());

        let outcome = broadcaster.broadcast("still here", None);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(text(&mut healthy_rx).as_deref(), Some("still here"));
        assert!(registry.get("b").is_none());
    }

    #[test]
    fn unicast_resolves_both_keys_to_the_same_session() {
        let (broadcaster, mut rxs) = hub_with_sessions(&[("t1", Some("app-42"))]);

        assert!(broadcaster.unicast("app-42", "x"));
        assert!(broadcaster.unicast("t1", "x"));
        assert_eq!(text(&mut rxs[0]).as_deref(), Some("x"));
        assert_eq!(text(&mut rxs[0]).as_deref(), Some("x"));
        assert!(text(&mut rxs[0]).is_none());
    }

    #[test]
    fn unicast_miss_reports_not_delivered() {
        let (broadcaster, _rxs) = hub_with_sessions(&[]);
        assert!(!broadcaster.unicast("nobody", "x"));
    }

    #[test]
    fn unicast_send_failure_evicts_the_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (s, rx) = session("t1", Some("app-42"));
        registry.insert(s);
        drop(rx);
        let broadcaster = Broadcaster::new(registry.clone());

        assert!(!broadcaster.unicast("app-42", "x"));
        assert!(registry.get("t1").is_none());
        assert!(registry.get("app-42").is_none());
    }

    #[test]
    fn stats_accumulate_across_passes() {
        let (broadcaster, _rxs) = hub_with_sessions(&[("a", None), ("b", None)]);

        broadcaster.broadcast("one", None);
        broadcaster.unicast("a", "two");

        let stats = broadcaster.stats();
        assert_eq!(stats.broadcasts, 1);
        assert_eq!(stats.unicasts, 1);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn full_buffer_counts_as_failure_and_evicts() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, _rx) = mpsc::channel(1);
        let stalled = Arc::new(SessionHandle::new("slow", None, tx));
        registry.insert(stalled.clone());
        let broadcaster = Broadcaster::new(registry.clone());

        assert!(broadcaster.unicast("slow", "fits"));
        // Second send hits a full buffer: the peer is presumed dead.
        assert!(!broadcaster.unicast("slow", "overflows"));
        assert!(registry.get("slow").is_none());
        assert_eq!(broadcaster.stats().evicted, 1);
    }
}
