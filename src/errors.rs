//! Agent Error Taxonomy
//!
//! Typed errors surfaced at the crate boundary. Internal plumbing uses
//! `anyhow`; operations whose failure carries contract meaning (refused
//! replay, duplicate registration, auth failures) return these variants.
//!
//! Messages rendered here may reach unauthenticated logs, so they never
//! include source ids, tokens, or secret material. Detailed reports are
//! available through the dedicated report APIs.

use std::collections::BTreeMap;

use crate::determinism::DivergenceKind;

#[derive(Debug)]
pub enum ChronosError {
    /// Replay refused: at least one unsafe source is registered.
    /// Maps source id to the reason it blocks replay. Do not retry without
    /// remediation.
    DeterminismViolation { sources: BTreeMap<String, String> },
    /// A source with this id is already registered.
    RegistrationConflict { source_id: String },
    /// IPC connection exceeded the per-connection message budget.
    RateLimitExceeded,
    /// IPC handshake or cross-process token mismatch.
    AuthenticationFailed { context: &'static str },
    /// A source's capture operation failed. Counted; recording continues.
    CaptureError { detail: String },
    /// Redaction or encoding failed. Counted; the event is dropped.
    SerializationError { detail: String },
    /// Recorded and replayed state disagree.
    Divergence { kind: DivergenceKind, message: String },
    /// Recording header version mismatch.
    IncompatibleRecording {
        warnings: Vec<String>,
        errors: Vec<String>,
    },
    /// Operation not legal in the current state machine state.
    InvalidState {
        operation: &'static str,
        state: String,
    },
    Io(std::io::Error),
}

impl std::fmt::Display for ChronosError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeterminismViolation { sources } => write!(
                f,
                "replay refused: {} source(s) violate determinism requirements",
                sources.len()
            ),
            Self::RegistrationConflict { source_id } => {
                write!(f, "source id already registered: {source_id}")
            }
            Self::RateLimitExceeded => write!(f, "connection exceeded message rate limit"),
            Self::AuthenticationFailed { context } => {
                write!(f, "authentication failed during {context}")
            }
            Self::CaptureError { detail } => write!(f, "state capture failed: {detail}"),
            Self::SerializationError { detail } => write!(f, "serialization failed: {detail}"),
            Self::Divergence { kind, message } => {
                write!(f, "{kind} divergence: {message}")
            }
            Self::IncompatibleRecording { warnings, errors } => write!(
                f,
                "incompatible recording: {} error(s), {} warning(s)",
                errors.len(),
                warnings.len()
            ),
            Self::InvalidState { operation, state } => {
                write!(f, "operation {operation} not legal in state {state}")
            }
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for ChronosError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChronosError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display_omits_source_ids() {
        let mut sources = BTreeMap::new();
        sources.insert(
            "secret-source".to_string(),
            "performs network I/O".to_string(),
        );
        let err = ChronosError::DeterminismViolation { sources };
        let rendered = err.to_string();
        assert!(!rendered.contains("secret-source"));
        assert!(rendered.contains("1 source(s)"));
    }

    #[test]
    fn test_invalid_state_display() {
        let err = ChronosError::InvalidState {
            operation: "pause",
            state: "Idle".to_string(),
        };
        assert_eq!(err.to_string(), "operation pause not legal in state Idle");
    }
}
