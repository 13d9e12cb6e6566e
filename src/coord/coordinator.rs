//! Multi-Process Coordinator
//!
//! Tracks replay state across cooperating processes. Every process
//! registers for an HMAC-SHA-256 token bound to its pid, name, and the
//! minute of registration; state updates must present that token and are
//! compared in constant time. Cross-process events are independently
//! signed with the shared secret; nothing is trusted on arrival without a
//! valid signature.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::errors::ChronosError;
use crate::ipc::constant_time_eq;
use crate::metrics::AgentStats;

type HmacSha256 = Hmac<Sha256>;

/// Processes count as synchronized while their replay positions are within
/// this many sequence numbers of each other.
pub const MAX_SEQUENCE_LAG: u64 = 100;

const SHARED_SECRET_LEN: usize = 32;

/// Replay state of one registered process.
#[derive(Debug, Clone)]
pub struct ProcessState {
    pub pid: u32,
    pub process_name: String,
    pub is_replaying: bool,
    pub last_sequence_no: u64,
    token: Vec<u8>,
}

/// A signed event exchanged between processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossProcessEvent {
    pub pid: u32,
    pub sequence_no: u64,
    pub event_type: String,
    pub signature: Vec<u8>,
}

/// HMAC-authenticated cross-process replay coordination.
pub struct ProcessCoordinator {
    /// Process-wide shared secret, generated once at startup.
    secret: [u8; SHARED_SECRET_LEN],
    processes: DashMap<u32, ProcessState>,
    coordinator_pid: Mutex<Option<u32>>,
    stats: Arc<AgentStats>,
}

impl ProcessCoordinator {
    pub fn new(stats: Arc<AgentStats>) -> Self {
        use rand::RngCore;
        let mut secret = [0u8; SHARED_SECRET_LEN];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self {
            secret,
            processes: DashMap::new(),
            coordinator_pid: Mutex::new(None),
            stats,
        }
    }

    /// Register a process and mint its auth token over
    /// `"{pid}:{name}:{minute_bucket}"`. The caller keeps the token for
    /// later state updates.
    pub fn register_process(&self, pid: u32, name: &str) -> Result<Vec<u8>> {
        let minute_bucket = Utc::now().timestamp() / 60;
        let token = self.sign(&format!("{pid}:{name}:{minute_bucket}"))?;

        self.processes.insert(
            pid,
            ProcessState {
                pid,
                process_name: name.to_string(),
                is_replaying: false,
                last_sequence_no: 0,
                token: token.clone(),
            },
        );
        debug!(pid, "process registered for coordination");
        Ok(token)
    }

    /// Mark the caller pid as coordinator. Idempotent.
    pub fn become_coordinator(&self, pid: u32) {
        let mut coordinator = self.coordinator_pid.lock();
        match *coordinator {
            Some(current) if current == pid => {}
            Some(current) => {
                debug!(from = current, to = pid, "coordinator role transferred");
                *coordinator = Some(pid);
            }
            None => *coordinator = Some(pid),
        }
    }

    pub fn coordinator_pid(&self) -> Option<u32> {
        *self.coordinator_pid.lock()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn get_process(&self, pid: u32) -> Option<ProcessState> {
        self.processes.get(&pid).map(|e| e.value().clone())
    }

    /// Overwrite a process's replay state after verifying its token by
    /// constant-time comparison against the stored token.
    pub fn update_replay_state(
        &self,
        pid: u32,
        is_replaying: bool,
        last_sequence_no: u64,
        token: &[u8],
    ) -> Result<(), ChronosError> {
        let mut entry = match self.processes.get_mut(&pid) {
            Some(entry) => entry,
            None => {
                AgentStats::incr(&self.stats.auth_failures);
                warn!("replay state update for unregistered process refused");
                return Err(ChronosError::AuthenticationFailed {
                    context: "replay state update",
                });
            }
        };

        if !constant_time_eq(token, &entry.token) {
            AgentStats::incr(&self.stats.auth_failures);
            warn!("replay state update with invalid token refused");
            return Err(ChronosError::AuthenticationFailed {
                context: "replay state update",
            });
        }

        entry.is_replaying = is_replaying;
        entry.last_sequence_no = last_sequence_no;
        Ok(())
    }

    /// Whether every registered process is replaying within
    /// [`MAX_SEQUENCE_LAG`] of the others.
    pub fn are_processes_synchronized(&self) -> bool {
        let mut min_seq = u64::MAX;
        let mut max_seq = 0u64;
        let mut any = false;
        for entry in self.processes.iter() {
            any = true;
            min_seq = min_seq.min(entry.last_sequence_no);
            max_seq = max_seq.max(entry.last_sequence_no);
        }
        !any || max_seq - min_seq <= MAX_SEQUENCE_LAG
    }

    /// Sign an outgoing cross-process event.
    pub fn sign_event(
        &self,
        pid: u32,
        sequence_no: u64,
        event_type: &str,
    ) -> Result<CrossProcessEvent> {
        let signature = self.sign(&format!("{pid}:{sequence_no}:{event_type}"))?;
        Ok(CrossProcessEvent {
            pid,
            sequence_no,
            event_type: event_type.to_string(),
            signature,
        })
    }

    /// Verify and accept an incoming event. Invalid signatures are dropped
    /// and logged; valid events advance the sender's known position.
    pub fn receive_event(&self, event: &CrossProcessEvent) -> bool {
        let expected = match self.sign(&format!(
            "{}:{}:{}",
            event.pid, event.sequence_no, event.event_type
        )) {
            Ok(signature) => signature,
            Err(_) => return false,
        };

        if !constant_time_eq(&event.signature, &expected) {
            AgentStats::incr(&self.stats.auth_failures);
            warn!("cross-process event with invalid signature dropped");
            return false;
        }

        if let Some(mut entry) = self.processes.get_mut(&event.pid) {
            entry.last_sequence_no = entry.last_sequence_no.max(event.sequence_no);
        }
        true
    }

    fn sign(&self, message: &str) -> Result<Vec<u8>> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).context("initialize HMAC with secret")?;
        mac.update(message.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
