//! Connection registry: the only shared mutable structure in the hub.
//!
//! One table maps identifier strings to sessions. A session always occupies
//! an entry under its transport id and, when the client supplied one, a
//! second entry under its alias; both point at the same handle. External
//! code never iterates the table directly — it goes through the atomic
//! operations exposed here (insert/remove/get/snapshot/count).

mod stats;
mod table;

pub use stats::RegistryStats;
pub use table::SessionRegistry;
