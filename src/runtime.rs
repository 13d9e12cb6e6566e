//! Agent Runtime
//!
//! One composite object owning every subsystem: registry, timeline,
//! classification pipeline, recorder, replay controller, sandbox,
//! coordinator, memory monitor, and the IPC server. The host facade holds
//! exactly one of these per process; tests build a fresh one per case.
//!
//! The agent is strictly debug-only: release builds of the host link a
//! no-op stub instead of constructing a runtime.

use std::io;
use std::sync::Arc;

use tracing::info;

use crate::config::AgentConfig;
use crate::coord::ProcessCoordinator;
use crate::determinism::{
    DeveloperContract, DivergenceReport, RefusalEngine, RefusalReport, RuntimeVerifier,
    StaticClassifier,
};
use crate::errors::ChronosError;
use crate::header::RecordingHeader;
use crate::ipc::{EventStreamBridge, IpcServer};
use crate::metrics::{AgentStats, AgentStatsSnapshot};
use crate::recording::{
    AdaptiveRecorder, DefaultRedaction, MemoryPressureListener, MemoryPressureMonitor,
    RecordingLevel,
};
use crate::replay::{ReplayController, ReplaySandbox, ReplaySummary};
use crate::sources::{SourceRegistry, StateSource};
use crate::timeline::{EventRingBuffer, TimelineEvent};

/// Pauses the recorder while the system is under memory pressure.
struct RecorderMemoryGate {
    recorder: Arc<AdaptiveRecorder>,
}

impl MemoryPressureListener for RecorderMemoryGate {
    fn on_paused(&self, _reason: &str) {
        self.recorder.set_level(RecordingLevel::Paused);
    }

    fn on_resumed(&self, _paused_for: std::time::Duration) {
        self.recorder.reset_recording_level();
    }
}

/// The composite agent runtime.
pub struct ChronosRuntime {
    config: AgentConfig,
    stats: Arc<AgentStats>,
    registry: Arc<SourceRegistry>,
    buffer: Arc<EventRingBuffer>,
    contract: Arc<DeveloperContract>,
    refusal: Arc<RefusalEngine>,
    recorder: Arc<AdaptiveRecorder>,
    controller: ReplayController,
    coordinator: Arc<ProcessCoordinator>,
    memory_monitor: Arc<MemoryPressureMonitor>,
    ipc: Arc<IpcServer>,
}

impl ChronosRuntime {
    /// Wire every subsystem from one configuration. Nothing starts running
    /// until [`initialize`] is called.
    ///
    /// [`initialize`]: Self::initialize
    pub fn new(config: AgentConfig) -> Self {
        let config = config.validated();
        let stats = Arc::new(AgentStats::new());
        let registry = Arc::new(SourceRegistry::new());
        let buffer = Arc::new(EventRingBuffer::new(config.buffer_capacity));
        let classifier = Arc::new(StaticClassifier::new());
        let contract = Arc::new(DeveloperContract::new());
        let verifier = Arc::new(RuntimeVerifier::new());
        let redaction = Arc::new(DefaultRedaction::new());
        let sandbox = Arc::new(ReplaySandbox::new(Arc::clone(&stats)));

        let refusal = Arc::new(RefusalEngine::new(
            Arc::clone(&registry),
            Arc::clone(&classifier),
            Arc::clone(&contract),
        ));

        let recorder = Arc::new(AdaptiveRecorder::new(
            Arc::clone(&registry),
            Arc::clone(&buffer),
            Arc::clone(&verifier),
            redaction.clone() as Arc<dyn crate::recording::RedactionStrategy>,
            Arc::clone(&stats),
            config.degradation,
        ));

        let controller = ReplayController::new(
            Arc::clone(&registry),
            Arc::clone(&refusal),
            Arc::clone(&verifier),
            Arc::clone(&contract),
            redaction,
            Arc::clone(&sandbox),
        );

        let memory_monitor = Arc::new(MemoryPressureMonitor::new(
            config.memory,
            config.memory_poll_interval,
            Arc::clone(&stats),
        ));
        memory_monitor.add_listener(Arc::new(RecorderMemoryGate {
            recorder: Arc::clone(&recorder),
        }));

        let ipc = Arc::new(IpcServer::new(&config, Arc::clone(&stats)));
        recorder.add_listener(Arc::new(EventStreamBridge::new(Arc::clone(&ipc))));

        let coordinator = Arc::new(ProcessCoordinator::new(Arc::clone(&stats)));

        Self {
            config,
            stats,
            registry,
            buffer,
            contract,
            refusal,
            recorder,
            controller,
            coordinator,
            memory_monitor,
            ipc,
        }
    }

    /// One-time startup: bind the IPC socket and start memory polling.
    pub fn initialize(&self) -> io::Result<()> {
        self.ipc.start()?;
        self.memory_monitor.start();
        info!("chronos agent initialized");
        Ok(())
    }

    /// Orderly teardown: stop the transport and the monitor, and mark the
    /// end of the timeline.
    pub fn shutdown(&self) {
        self.ipc.stop();
        self.memory_monitor.stop();
        self.recorder.emit_gap("agent shutdown");
        info!("chronos agent shut down");
    }

    pub fn register_source(&self, source: Arc<dyn StateSource>) -> Result<(), ChronosError> {
        self.registry.register(source)
    }

    pub fn unregister_source(&self, source_id: &str) -> bool {
        self.registry.unregister(source_id)
    }

    pub fn get_registered_sources(&self) -> Vec<Arc<dyn StateSource>> {
        self.registry.get_all()
    }

    pub fn set_recording_level(&self, level: RecordingLevel) {
        self.recorder.set_level(level);
    }

    /// Capture every registered source once.
    pub fn record_all(&self) -> usize {
        self.recorder.record_all()
    }

    pub fn get_refusal_report(&self) -> RefusalReport {
        self.refusal.evaluate()
    }

    pub fn get_divergence_report(&self) -> DivergenceReport {
        self.controller.get_divergence_report()
    }

    pub fn start_replay(&self, events: &[TimelineEvent]) -> Result<ReplaySummary, ChronosError> {
        self.controller.start_replay(events)
    }

    /// The IPC session token. In-process API only; never log it.
    pub fn get_ipc_auth_token(&self) -> &str {
        self.ipc.auth_token()
    }

    /// Header describing a recording made by this runtime.
    pub fn recording_header(&self) -> RecordingHeader {
        RecordingHeader::new(self.config.app_id.clone(), current_process_name())
    }

    pub fn timeline(&self) -> &Arc<EventRingBuffer> {
        &self.buffer
    }

    pub fn recorder(&self) -> &Arc<AdaptiveRecorder> {
        &self.recorder
    }

    pub fn replay_controller(&self) -> &ReplayController {
        &self.controller
    }

    pub fn contract(&self) -> &Arc<DeveloperContract> {
        &self.contract
    }

    pub fn coordinator(&self) -> &Arc<ProcessCoordinator> {
        &self.coordinator
    }

    pub fn memory_monitor(&self) -> &Arc<MemoryPressureMonitor> {
        &self.memory_monitor
    }

    pub fn ipc_server(&self) -> &Arc<IpcServer> {
        &self.ipc
    }

    pub fn stats(&self) -> AgentStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for ChronosRuntime {
    fn drop(&mut self) {
        self.ipc.stop();
        self.memory_monitor.stop();
    }
}

fn current_process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| format!("pid-{}", std::process::id()))
}
