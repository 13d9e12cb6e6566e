//! Agent Counters
//!
//! Lightweight atomic counters for the recording and transport paths.
//! `snapshot()` produces a serializable point-in-time view for the
//! debugger UI stream.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct AgentStats {
    pub snapshots_recorded: AtomicU64,
    pub events_skipped: AtomicU64,
    pub capture_errors: AtomicU64,
    pub serialization_errors: AtomicU64,
    pub redactions_applied: AtomicU64,
    pub gaps_emitted: AtomicU64,
    pub checkpoints_created: AtomicU64,
    pub degradations: AtomicU64,
    pub auth_failures: AtomicU64,
    pub handshake_failures: AtomicU64,
    pub events_streamed: AtomicU64,
    pub messages_received: AtomicU64,
    pub rate_limited_connections: AtomicU64,
    pub blocked_operations: AtomicU64,
    pub memory_pauses: AtomicU64,
}

impl AgentStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AgentStatsSnapshot {
        AgentStatsSnapshot {
            snapshots_recorded: self.snapshots_recorded.load(Ordering::Relaxed),
            events_skipped: self.events_skipped.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
            serialization_errors: self.serialization_errors.load(Ordering::Relaxed),
            redactions_applied: self.redactions_applied.load(Ordering::Relaxed),
            gaps_emitted: self.gaps_emitted.load(Ordering::Relaxed),
            checkpoints_created: self.checkpoints_created.load(Ordering::Relaxed),
            degradations: self.degradations.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            events_streamed: self.events_streamed.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            rate_limited_connections: self.rate_limited_connections.load(Ordering::Relaxed),
            blocked_operations: self.blocked_operations.load(Ordering::Relaxed),
            memory_pauses: self.memory_pauses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatsSnapshot {
    pub snapshots_recorded: u64,
    pub events_skipped: u64,
    pub capture_errors: u64,
    pub serialization_errors: u64,
    pub redactions_applied: u64,
    pub gaps_emitted: u64,
    pub checkpoints_created: u64,
    pub degradations: u64,
    pub auth_failures: u64,
    pub handshake_failures: u64,
    pub events_streamed: u64,
    pub messages_received: u64,
    pub rate_limited_connections: u64,
    pub blocked_operations: u64,
    pub memory_pauses: u64,
}
