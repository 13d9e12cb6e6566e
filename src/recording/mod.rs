//! Adaptive recording: the capture pipeline, its lock-free state cell,
//! redaction, and the memory pressure gate.

mod memory;
mod recorder;
mod redaction;
mod state;

pub use memory::{MemoryPressureListener, MemoryPressureMonitor, CRITICAL_TRIM_LEVEL};
pub use recorder::{AdaptiveRecorder, RecorderListener};
pub use redaction::{
    DefaultRedaction, RedactionOutcome, RedactionStrategy, API_KEY_REDACTED, JWT_REDACTED,
    POTENTIAL_TOKEN_REDACTED, REDACTED,
};
pub use state::{RecordingLevel, RecordingState, RecordingStateCell};
