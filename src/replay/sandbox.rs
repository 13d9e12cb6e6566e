//! Hermetic Replay Sandbox
//!
//! Process-wide flag with guards for five operation types. While active,
//! network, system-service, and IPC operations are blocked outright;
//! database and file-system reads are permitted but logged, writes are
//! blocked. Every blocked operation is appended to a synchronized log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::metrics::AgentStats;
use crate::timeline::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GuardedOperation {
    Network,
    Database,
    Filesystem,
    SystemService,
    Ipc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessMode {
    Read,
    Write,
}

/// One operation the sandbox refused.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedOperation {
    pub timestamp_ms: i64,
    pub operation: GuardedOperation,
    pub mode: AccessMode,
    pub description: String,
}

/// Process-wide replay isolation flag plus the blocked-operation log.
pub struct ReplaySandbox {
    active: AtomicBool,
    blocked: Mutex<Vec<BlockedOperation>>,
    stats: Arc<AgentStats>,
}

impl ReplaySandbox {
    pub fn new(stats: Arc<AgentStats>) -> Self {
        Self {
            active: AtomicBool::new(false),
            blocked: Mutex::new(Vec::new()),
            stats,
        }
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
        debug!("replay sandbox activated");
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        debug!("replay sandbox deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether the given operation must be blocked right now. Inactive
    /// sandboxes never block and never log.
    pub fn should_block(
        &self,
        operation: GuardedOperation,
        mode: AccessMode,
        description: &str,
    ) -> bool {
        if !self.is_active() {
            return false;
        }

        let block = match operation {
            GuardedOperation::Network
            | GuardedOperation::SystemService
            | GuardedOperation::Ipc => true,
            GuardedOperation::Database | GuardedOperation::Filesystem => {
                mode == AccessMode::Write
            }
        };

        if block {
            AgentStats::incr(&self.stats.blocked_operations);
            warn!(?operation, ?mode, "operation blocked during replay");
            self.blocked.lock().push(BlockedOperation {
                timestamp_ms: now_ms(),
                operation,
                mode,
                description: description.to_string(),
            });
        } else {
            debug!(?operation, ?mode, "guarded read permitted during replay");
        }
        block
    }

    /// Snapshot of everything blocked so far.
    pub fn blocked_operations(&self) -> Vec<BlockedOperation> {
        self.blocked.lock().clone()
    }

    pub fn clear_log(&self) {
        self.blocked.lock().clear();
    }
}

/// Guard handles held by the subsystems the sandbox polices. Each check
/// returns true when the operation must be refused.
pub struct NetworkGuard(pub Arc<ReplaySandbox>);

impl NetworkGuard {
    pub fn check_request(&self, description: &str) -> bool {
        self.0
            .should_block(GuardedOperation::Network, AccessMode::Write, description)
    }
}

pub struct DatabaseGuard(pub Arc<ReplaySandbox>);

impl DatabaseGuard {
    pub fn check_read(&self, description: &str) -> bool {
        self.0
            .should_block(GuardedOperation::Database, AccessMode::Read, description)
    }

    pub fn check_write(&self, description: &str) -> bool {
        self.0
            .should_block(GuardedOperation::Database, AccessMode::Write, description)
    }
}

pub struct FilesystemGuard(pub Arc<ReplaySandbox>);

impl FilesystemGuard {
    pub fn check_read(&self, description: &str) -> bool {
        self.0
            .should_block(GuardedOperation::Filesystem, AccessMode::Read, description)
    }

    pub fn check_write(&self, description: &str) -> bool {
        self.0
            .should_block(GuardedOperation::Filesystem, AccessMode::Write, description)
    }
}

pub struct SystemServiceGuard(pub Arc<ReplaySandbox>);

impl SystemServiceGuard {
    pub fn check_call(&self, description: &str) -> bool {
        self.0.should_block(
            GuardedOperation::SystemService,
            AccessMode::Write,
            description,
        )
    }
}

pub struct IpcGuard(pub Arc<ReplaySandbox>);

impl IpcGuard {
    pub fn check_send(&self, description: &str) -> bool {
        self.0
            .should_block(GuardedOperation::Ipc, AccessMode::Write, description)
    }
}
