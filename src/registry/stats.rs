//! Registry statistics structures

use serde::Serialize;

/// Snapshot of registry occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    /// Distinct open sessions after implicit cleanup.
    pub live_sessions: usize,
    /// Raw table size; alias entries count separately.
    pub table_entries: usize,
}
