//! Replay Controller
//!
//! Drives event-by-event replay behind a pre-flight refusal check and the
//! hermetic sandbox. Structural divergence halts replay immediately;
//! temporal divergence warns; everything else is informational.
//!
//! State machine: Idle -> Preflight -> Replaying <-> Paused -> Completed or
//! Aborted. Abort is legal from any state and always deactivates the
//! sandbox.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::sandbox::ReplaySandbox;
use crate::determinism::{
    DeveloperContract, DivergenceKind, DivergenceRecord, DivergenceReport, RefusalEngine,
    RuntimeVerifier,
};
use crate::errors::ChronosError;
use crate::recording::RedactionStrategy;
use crate::sources::SourceRegistry;
use crate::timeline::{DeterminismClass, TimelineEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplayPhase {
    Idle,
    Preflight,
    Replaying,
    Paused,
    Completed,
    Aborted,
}

impl ReplayPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Preflight => "Preflight",
            Self::Replaying => "Replaying",
            Self::Paused => "Paused",
            Self::Completed => "Completed",
            Self::Aborted => "Aborted",
        }
    }
}

/// Outcome of one replay run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub success: bool,
    pub events_replayed: usize,
    pub checkpoints_acknowledged: usize,
    pub divergences: DivergenceReport,
}

/// Pre-flight-gated, sandboxed replay driver.
pub struct ReplayController {
    registry: Arc<SourceRegistry>,
    refusal: Arc<RefusalEngine>,
    verifier: Arc<RuntimeVerifier>,
    contract: Arc<DeveloperContract>,
    redaction: Arc<dyn RedactionStrategy>,
    sandbox: Arc<ReplaySandbox>,
    phase: Mutex<ReplayPhase>,
    abort_requested: AtomicBool,
    last_report: RwLock<DivergenceReport>,
}

impl ReplayController {
    pub fn new(
        registry: Arc<SourceRegistry>,
        refusal: Arc<RefusalEngine>,
        verifier: Arc<RuntimeVerifier>,
        contract: Arc<DeveloperContract>,
        redaction: Arc<dyn RedactionStrategy>,
        sandbox: Arc<ReplaySandbox>,
    ) -> Self {
        Self {
            registry,
            refusal,
            verifier,
            contract,
            redaction,
            sandbox,
            phase: Mutex::new(ReplayPhase::Idle),
            abort_requested: AtomicBool::new(false),
            last_report: RwLock::new(DivergenceReport::default()),
        }
    }

    pub fn phase(&self) -> ReplayPhase {
        *self.phase.lock()
    }

    pub fn sandbox(&self) -> &Arc<ReplaySandbox> {
        &self.sandbox
    }

    /// Divergences observed by the most recent replay run.
    pub fn get_divergence_report(&self) -> DivergenceReport {
        self.last_report.read().clone()
    }

    /// Replay recorded events against the live registry.
    pub fn start_replay(
        &self,
        events: &[TimelineEvent],
    ) -> Result<ReplaySummary, ChronosError> {
        {
            let mut phase = self.phase.lock();
            match *phase {
                ReplayPhase::Idle | ReplayPhase::Completed | ReplayPhase::Aborted => {
                    *phase = ReplayPhase::Preflight;
                }
                other => {
                    return Err(ChronosError::InvalidState {
                        operation: "start_replay",
                        state: other.as_str().to_string(),
                    });
                }
            }
        }
        self.abort_requested.store(false, Ordering::SeqCst);

        if let Err(e) = self.preflight() {
            *self.phase.lock() = ReplayPhase::Aborted;
            return Err(e);
        }

        self.sandbox.activate();
        *self.phase.lock() = ReplayPhase::Replaying;
        info!(events = events.len(), "replay started");

        let (replayed, acknowledged, report, halted) = self.run_events(events);

        // The sandbox comes down on every exit path.
        self.sandbox.deactivate();

        let aborted = halted || self.abort_requested.load(Ordering::SeqCst);
        *self.phase.lock() = if aborted {
            ReplayPhase::Aborted
        } else {
            ReplayPhase::Completed
        };

        let success = !aborted && !report.has_halting();
        info!(
            success,
            replayed,
            divergences = report.len(),
            "replay finished"
        );
        *self.last_report.write() = report.clone();

        Ok(ReplaySummary {
            success,
            events_replayed: replayed,
            checkpoints_acknowledged: acknowledged,
            divergences: report,
        })
    }

    /// Pause iteration. Legal only while replaying.
    pub fn pause(&self) -> Result<(), ChronosError> {
        let mut phase = self.phase.lock();
        if *phase != ReplayPhase::Replaying {
            return Err(ChronosError::InvalidState {
                operation: "pause",
                state: phase.as_str().to_string(),
            });
        }
        *phase = ReplayPhase::Paused;
        Ok(())
    }

    /// Resume iteration. Legal only while paused.
    pub fn resume(&self) -> Result<(), ChronosError> {
        let mut phase = self.phase.lock();
        if *phase != ReplayPhase::Paused {
            return Err(ChronosError::InvalidState {
                operation: "resume",
                state: phase.as_str().to_string(),
            });
        }
        *phase = ReplayPhase::Replaying;
        Ok(())
    }

    /// Abort. Always legal; deactivates the sandbox.
    pub fn abort(&self) {
        self.abort_requested.store(true, Ordering::SeqCst);
        *self.phase.lock() = ReplayPhase::Aborted;
        self.sandbox.deactivate();
    }

    fn preflight(&self) -> Result<(), ChronosError> {
        let report = self.refusal.evaluate();
        if !report.is_allowed {
            let sources: BTreeMap<String, String> = report
                .blocking_reasons
                .iter()
                .map(|r| (r.source_id.clone(), r.reason.clone()))
                .collect();
            return Err(ChronosError::DeterminismViolation { sources });
        }

        let failed = self.contract.evaluate_assertions();
        if !failed.is_empty() {
            let sources: BTreeMap<String, String> = failed
                .into_iter()
                .map(|name| (name, "runtime assertion failed".to_string()))
                .collect();
            return Err(ChronosError::DeterminismViolation { sources });
        }

        let conditional = self
            .registry
            .get_by_class(&[DeterminismClass::Conditional])
            .len();
        if conditional > 0 {
            warn!(
                count = conditional,
                "replaying with conditionally-safe sources registered"
            );
        }
        Ok(())
    }

    fn run_events(
        &self,
        events: &[TimelineEvent],
    ) -> (usize, usize, DivergenceReport, bool) {
        let mut report = DivergenceReport::default();
        let mut replayed = 0usize;
        let mut acknowledged = 0usize;

        for event in events {
            if self.abort_requested.load(Ordering::SeqCst) {
                return (replayed, acknowledged, report, true);
            }
            // Hold here while paused; abort stays observable.
            while self.phase() == ReplayPhase::Paused {
                if self.abort_requested.load(Ordering::SeqCst) {
                    return (replayed, acknowledged, report, true);
                }
                std::thread::sleep(Duration::from_millis(5));
            }

            match event {
                TimelineEvent::Snapshot(snap) => {
                    match self.verify_snapshot(snap, &mut report) {
                        Ok(()) => replayed += 1,
                        Err(()) => return (replayed, acknowledged, report, true),
                    }
                }
                TimelineEvent::Checkpoint(cp) => {
                    debug!(checkpoint = %cp.checkpoint_id, "checkpoint acknowledged");
                    acknowledged += 1;
                    replayed += 1;
                }
                TimelineEvent::Gap(gap) => {
                    debug!(reason = %gap.reason, "gap noted during replay");
                    replayed += 1;
                }
                TimelineEvent::Log(_) => {
                    replayed += 1;
                }
            }
        }

        (replayed, acknowledged, report, false)
    }

    /// Verify one snapshot. `Err(())` means a halting divergence.
    fn verify_snapshot(
        &self,
        snap: &crate::timeline::SnapshotEvent,
        report: &mut DivergenceReport,
    ) -> Result<(), ()> {
        let Some(source) = self.registry.get(&snap.source_id) else {
            let record = DivergenceRecord::new(
                snap.sequence_no,
                Some(snap.source_id.clone()),
                DivergenceKind::Structural,
                "recorded source is no longer registered",
            );
            let halts = record.kind.should_halt();
            report.push(record);
            return if halts { Err(()) } else { Ok(()) };
        };

        let Some(recorded_hash) = snap.checkpoint_hash() else {
            // Nothing to verify against; the event replays as-is.
            return Ok(());
        };

        // Rehydrate the recorded hash so deserialized recordings verify
        // the same way live ones do.
        if !self.verifier.contains(snap.sequence_no) {
            self.verifier
                .store_checkpoint(snap.sequence_no, recorded_hash);
        }

        let descriptor = source.descriptor();
        let live = match source.capture_state() {
            Ok(value) => value,
            Err(e) => {
                report.push(DivergenceRecord::new(
                    snap.sequence_no,
                    Some(snap.source_id.clone()),
                    DivergenceKind::Structural,
                    format!("live capture failed during replay: {e}"),
                ));
                return Err(());
            }
        };
        // Same pipeline as recording: verify redacted state, not raw state.
        let live = self.redaction.redact(live, &descriptor).value;

        let outcome = self.verifier.verify_against_checkpoint(
            snap.sequence_no,
            &descriptor.type_name,
            descriptor.shape,
            &live,
        );

        match outcome.divergence {
            DivergenceKind::None => Ok(()),
            kind => {
                if kind.should_warn() {
                    warn!(sequence = snap.sequence_no, "temporal divergence during replay");
                }
                let halts = kind.should_halt();
                report.push(DivergenceRecord::new(
                    snap.sequence_no,
                    Some(snap.source_id.clone()),
                    kind,
                    outcome.message,
                ));
                if halts {
                    Err(())
                } else {
                    Ok(())
                }
            }
        }
    }
}
