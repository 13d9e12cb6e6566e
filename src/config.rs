//! Agent Configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::timeline::{DEFAULT_CAPACITY, MIN_CAPACITY};

/// Degradation ladder thresholds, events per wall-clock second.
#[derive(Debug, Clone, Copy)]
pub struct DegradationThresholds {
    /// Above this rate, recording drops to Reduced.
    pub reduced: u64,
    /// Above this rate, recording drops to Minimal.
    pub minimal: u64,
    /// Above this rate, recording pauses entirely.
    pub paused: u64,
}

impl Default for DegradationThresholds {
    fn default() -> Self {
        Self {
            reduced: 200,
            minimal: 500,
            paused: 1000,
        }
    }
}

/// Memory pressure thresholds as available/total ratios.
#[derive(Debug, Clone, Copy)]
pub struct MemoryThresholds {
    /// Pause recording when available memory drops below this share.
    pub pause_below: f64,
    /// Resume once available memory climbs back above this share.
    pub resume_above: f64,
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            pause_below: 0.15,
            resume_above: 0.25,
        }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Ring buffer capacity in events. Clamped to at least 100.
    pub buffer_capacity: usize,
    pub degradation: DegradationThresholds,
    pub memory: MemoryThresholds,
    /// How often the memory monitor polls system memory.
    pub memory_poll_interval: Duration,
    /// Unix socket path the IPC server listens on.
    pub ipc_socket_path: PathBuf,
    /// Per-connection message budget per rate-limit window.
    pub rate_limit_max_messages: u32,
    pub rate_limit_window: Duration,
    /// Application identifier written into recording headers.
    pub app_id: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_CAPACITY,
            degradation: DegradationThresholds::default(),
            memory: MemoryThresholds::default(),
            memory_poll_interval: Duration::from_secs(1),
            ipc_socket_path: std::env::temp_dir().join("chronos-agent.sock"),
            rate_limit_max_messages: 1000,
            rate_limit_window: Duration::from_secs(60),
            app_id: "unknown-app".to_string(),
        }
    }
}

impl AgentConfig {
    /// Apply hard floors. Called by the runtime before wiring components.
    pub fn validated(mut self) -> Self {
        self.buffer_capacity = self.buffer_capacity.max(MIN_CAPACITY);
        self
    }
}
