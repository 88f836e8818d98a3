//! Connection identifiers and admission results.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::config::Strategy;
use crate::load_balancer::instance::InstanceSnapshot;

/// Global atomic counter for connection IDs.
/// Relaxed ordering suffices: only uniqueness is needed.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an admitted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How an instance came to be chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectionDecision {
    /// Configured strategy.
    pub strategy: Strategy,
    /// The strategy's pick was full and least-connections over instances
    /// with spare capacity chose instead.
    pub capacity_fallback: bool,
    /// The request waited in the admission queue.
    pub queued: bool,
}

/// Outcome of a successful admission. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadBalancingResult {
    /// The chosen instance as it was right after admission.
    pub instance: InstanceSnapshot,
    pub connection_id: ConnectionId,
    pub decision: SelectionDecision,
    pub timestamp: SystemTime,
}

impl LoadBalancingResult {
    pub fn instance_id(&self) -> uuid::Uuid {
        self.instance.id
    }
}
