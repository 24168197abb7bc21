use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::session::SessionHandle;

use super::RegistryStats;

/// Dual-keyed index of live sessions.
///
/// Entries are evicted lazily: read operations (`live_count`, and the
/// broadcast path via `prune_closed`) drop entries whose session is no
/// longer open as a side effect. Callers must treat counts as
/// "count after implicit cleanup", never as raw table size.
pub struct SessionRegistry {
    entries: DashMap<String, Arc<SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register a session under its transport id and, when present, its
    /// alias. An existing binding at either key is replaced, not merged;
    /// the replaced session is left untouched (the transport decides when
    /// to close it).
    pub fn insert(&self, session: Arc<SessionHandle>) {
        self.entries
            .insert(session.id().to_owned(), session.clone());
        if let Some(alias) = session.alias() {
            self.entries.insert(alias.to_owned(), session.clone());
        }
        tracing::debug!(
            session_id = %session.id(),
            alias = session.alias().unwrap_or("-"),
            "Session registered"
        );
    }

    /// Remove the binding for `key` together with any other key pointing at
    /// the same session, so no alias outlives its session. Returns the
    /// removed handle, or `None` when the key was unknown.
    pub fn remove(&self, key: &str) -> Option<Arc<SessionHandle>> {
        let (_, session) = self.entries.remove(key)?;
        for other in [Some(session.id()), session.alias()].into_iter().flatten() {
            if other != key {
                // Pointer equality keeps a newer session that reclaimed the
                // same key from being evicted alongside the old one.
                self.entries
                    .remove_if(other, |_, held| Arc::ptr_eq(held, &session));
            }
        }
        tracing::debug!(session_id = %session.id(), removed_key = %key, "Session removed");
        Some(session)
    }

    /// Look up a session by transport id or alias. No side effects.
    pub fn get(&self, key: &str) -> Option<Arc<SessionHandle>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Point-in-time copy of the table's values. May contain the same
    /// session twice (transport id + alias); fan-out dedups before sending.
    pub fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Drop every entry whose session is no longer open. Returns how many
    /// entries were evicted.
    pub fn prune_closed(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, session| session.is_open());
        before.saturating_sub(self.entries.len())
    }

    /// Number of distinct, currently open sessions. An aliased session
    /// counts once. Prunes closed entries as a side effect.
    pub fn live_count(&self) -> usize {
        self.prune_closed();
        let mut distinct = HashSet::new();
        for entry in self.entries.iter() {
            let session = entry.value();
            if session.is_open() {
                distinct.insert(session.id().to_owned());
            }
        }
        distinct.len()
    }

    /// Take every registered session (deduplicated) and leave the table
    /// empty. Used at teardown.
    pub fn drain(&self) -> Vec<Arc<SessionHandle>> {
        let mut seen = HashSet::new();
        let mut sessions = Vec::new();
        for entry in self.entries.iter() {
            let session = entry.value();
            if seen.insert(session.id().to_owned()) {
                sessions.push(session.clone());
            }
        }
        self.entries.clear();
        sessions
    }

    /// Raw table size, counting alias entries separately.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let live_sessions = self.live_count();
        RegistryStats {
            live_sessions,
            table_entries: self.entries.len(),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
