//! Divergence Classification
//!
//! Maps verification outcomes to a small closed set of divergence kinds and
//! the halt/warn policy attached to them. Structural divergence halts replay;
//! temporal divergence warns; identity and none are informational.

use serde::{Deserialize, Serialize};

use crate::timeline::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DivergenceKind {
    None,
    /// Recorded and live state disagree in content or the checkpoint is
    /// missing entirely.
    Structural,
    /// Ordering or timing drift between recorded and replayed events.
    Temporal,
    /// Same content observed through a different instance identity.
    Identity,
}

impl DivergenceKind {
    pub fn should_halt(&self) -> bool {
        matches!(self, Self::Structural)
    }

    pub fn should_warn(&self) -> bool {
        matches!(self, Self::Temporal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Structural => "structural",
            Self::Temporal => "temporal",
            Self::Identity => "identity",
        }
    }
}

impl std::fmt::Display for DivergenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed discrepancy between recorded and replayed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergenceRecord {
    pub timestamp_ms: i64,
    pub sequence_no: u64,
    pub source_id: Option<String>,
    pub kind: DivergenceKind,
    pub message: String,
}

impl DivergenceRecord {
    pub fn new(
        sequence_no: u64,
        source_id: Option<String>,
        kind: DivergenceKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_ms: now_ms(),
            sequence_no,
            source_id,
            kind,
            message: message.into(),
        }
    }
}

/// Accumulated divergences for one replay run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DivergenceReport {
    pub records: Vec<DivergenceRecord>,
}

impl DivergenceReport {
    pub fn push(&mut self, record: DivergenceRecord) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn count_of(&self, kind: DivergenceKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    pub fn has_halting(&self) -> bool {
        self.records.iter().any(|r| r.kind.should_halt())
    }
}
