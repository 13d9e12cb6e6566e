//! Adaptive State Recorder
//!
//! Captures source state through the registered sources, applies redaction,
//! and emits snapshot events with strictly increasing sequence numbers.
//! Sheds load through the degradation ladder: Full, Reduced, Minimal,
//! Paused. Every demotion is announced with a gap event so replay tooling
//! can see where history thinned out.
//!
//! Capture failures never halt recording; they are counted and logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, warn};

use super::redaction::RedactionStrategy;
use super::state::{RecordingLevel, RecordingStateCell};
use crate::config::DegradationThresholds;
use crate::determinism::RuntimeVerifier;
use crate::metrics::AgentStats;
use crate::sources::{SourceRegistry, StateSource};
use crate::timeline::{
    current_thread_name, now_ms, CheckpointEvent, DeterminismClass, EventRingBuffer, GapEvent,
    SnapshotEvent, TimelineEvent,
};

/// Observer of recorded events, notified after the event is in the buffer.
pub trait RecorderListener: Send + Sync {
    fn on_event(&self, event: &TimelineEvent);
}

/// Captures source state into the timeline with adaptive load shedding.
pub struct AdaptiveRecorder {
    registry: Arc<SourceRegistry>,
    buffer: Arc<EventRingBuffer>,
    verifier: Arc<RuntimeVerifier>,
    redaction: Arc<dyn RedactionStrategy>,
    stats: Arc<AgentStats>,
    state: RecordingStateCell,
    sequence: AtomicU64,
    thresholds: DegradationThresholds,
    listeners: RwLock<Vec<Arc<dyn RecorderListener>>>,
}

impl AdaptiveRecorder {
    pub fn new(
        registry: Arc<SourceRegistry>,
        buffer: Arc<EventRingBuffer>,
        verifier: Arc<RuntimeVerifier>,
        redaction: Arc<dyn RedactionStrategy>,
        stats: Arc<AgentStats>,
        thresholds: DegradationThresholds,
    ) -> Self {
        Self {
            registry,
            buffer,
            verifier,
            redaction,
            stats,
            state: RecordingStateCell::new(),
            sequence: AtomicU64::new(1),
            thresholds,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn RecorderListener>) {
        self.listeners.write().push(listener);
    }

    pub fn current_level(&self) -> RecordingLevel {
        self.state.level()
    }

    pub fn set_level(&self, level: RecordingLevel) {
        debug!(level = %level, "recording level set");
        self.state.set_level(level);
    }

    /// Restore Full recording after degradation or an external pause.
    pub fn reset_recording_level(&self) {
        self.set_level(RecordingLevel::Full);
    }

    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed).saturating_sub(1)
    }

    #[inline]
    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Capture one source at the current wall time.
    pub fn record(&self, source: &dyn StateSource) -> Option<u64> {
        self.record_at(source, now_ms())
    }

    /// Capture one source at an explicit timestamp. This is the injection
    /// point for load tests that drive many captures into one wall-clock
    /// second.
    pub fn record_at(&self, source: &dyn StateSource, timestamp_ms: i64) -> Option<u64> {
        let (prev, state) = self.state.advance(timestamp_ms / 1000, &self.thresholds);
        if state.level != prev.level {
            self.emit_degradation_gap(state.level, timestamp_ms);
        }

        let class = source.declared_class();
        if !state.level.records(class) {
            AgentStats::incr(&self.stats.events_skipped);
            return None;
        }

        let raw = match source.capture_state() {
            Ok(value) => value,
            Err(e) => {
                AgentStats::incr(&self.stats.capture_errors);
                warn!(error = %e, "state capture failed");
                return None;
            }
        };

        let descriptor = source.descriptor();
        let outcome = self.redaction.redact(raw, &descriptor);
        if outcome.redacted_count > 0 {
            self.stats
                .redactions_applied
                .fetch_add(outcome.redacted_count, Ordering::Relaxed);
        }

        let value_bytes = match serde_json::to_vec(&outcome.value) {
            Ok(bytes) => bytes,
            Err(e) => {
                AgentStats::incr(&self.stats.serialization_errors);
                warn!(error = %e, "snapshot serialization failed");
                return None;
            }
        };

        let sequence_no = self.next_seq();

        // Verifiable sources get a checkpoint hash over the redacted value,
        // so replay can compare recorded state against live state.
        let checkpoint_hash = if class == DeterminismClass::Verifiable {
            AgentStats::incr(&self.stats.checkpoints_created);
            Some(self.verifier.create_checkpoint(
                sequence_no,
                &descriptor.type_name,
                descriptor.shape,
                &outcome.value,
            ))
        } else {
            None
        };

        let event = TimelineEvent::Snapshot(SnapshotEvent::new(
            timestamp_ms,
            sequence_no,
            current_thread_name(),
            source.source_id().to_string(),
            class,
            descriptor.type_name.clone(),
            &value_bytes,
            checkpoint_hash.as_deref(),
        ));

        self.buffer.append(event.clone());
        AgentStats::incr(&self.stats.snapshots_recorded);
        self.notify(&event);
        Some(sequence_no)
    }

    /// Sweep every registered source once. Returns how many snapshots were
    /// recorded.
    pub fn record_all(&self) -> usize {
        self.registry
            .get_all()
            .iter()
            .filter(|source| self.record(source.as_ref()).is_some())
            .count()
    }

    /// Emit a checkpoint event hashing the current registered source set.
    pub fn record_checkpoint(&self, checkpoint_id: impl Into<String>) -> u64 {
        let mut ids: Vec<String> = self
            .registry
            .get_all()
            .iter()
            .map(|s| s.source_id().to_string())
            .collect();
        ids.sort();

        let state = json!({ "sources": ids });
        let sequence_no = self.next_seq();
        let hash = self.verifier.create_checkpoint(
            sequence_no,
            "chronos::SourceSet",
            crate::sources::TypeShape::PureData,
            &state,
        );
        AgentStats::incr(&self.stats.checkpoints_created);

        let event = TimelineEvent::Checkpoint(CheckpointEvent {
            timestamp_ms: now_ms(),
            sequence_no,
            thread_name: current_thread_name(),
            checkpoint_id: checkpoint_id.into(),
            state_hash: hex::encode(hash),
            source_count: ids.len(),
        });
        self.buffer.append(event.clone());
        self.notify(&event);
        sequence_no
    }

    /// Append a gap marker with a caller-supplied reason, e.g. at agent
    /// shutdown. Returns its sequence number.
    pub fn emit_gap(&self, reason: impl Into<String>) -> u64 {
        let sequence_no = self.next_seq();
        AgentStats::incr(&self.stats.gaps_emitted);
        let event = TimelineEvent::Gap(GapEvent {
            timestamp_ms: now_ms(),
            sequence_no,
            thread_name: current_thread_name(),
            reason: reason.into(),
            missed_count: None,
            duration_ms: None,
        });
        self.buffer.append(event.clone());
        self.notify(&event);
        sequence_no
    }

    fn emit_degradation_gap(&self, new_level: RecordingLevel, timestamp_ms: i64) {
        let threshold = match new_level {
            RecordingLevel::Reduced => self.thresholds.reduced,
            RecordingLevel::Minimal => self.thresholds.minimal,
            RecordingLevel::Paused => self.thresholds.paused,
            RecordingLevel::Full => return,
        };

        AgentStats::incr(&self.stats.degradations);
        AgentStats::incr(&self.stats.gaps_emitted);
        warn!(level = %new_level, "recording degraded under load");

        let event = TimelineEvent::Gap(GapEvent {
            timestamp_ms,
            sequence_no: self.next_seq(),
            thread_name: current_thread_name(),
            reason: format!("Event rate exceeded {threshold}/s"),
            missed_count: None,
            duration_ms: None,
        });
        self.buffer.append(event.clone());
        self.notify(&event);
    }

    fn notify(&self, event: &TimelineEvent) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            listener.on_event(event);
        }
    }
}
