//! Timeline Event Model
//!
//! Tagged event union for the recording timeline. Snapshot payloads are
//! defensively copied on construction and on read so that no caller can
//! mutate an event after it has been appended.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Sentinel sequence number used by buffer-synthesized overflow gaps.
///
/// Recorder-assigned sequences start at 1 and increase strictly, so the
/// sentinel can never collide with a real event.
pub const OVERFLOW_GAP_SEQUENCE: u64 = u64::MAX;

/// Determinism class of a state source, ordered by safety (safest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeterminismClass {
    /// Pure immutable data: primitives, tagged unions, immutable collections.
    Guaranteed,
    /// Observable state holders whose value is checkable at runtime.
    Verifiable,
    /// Isolated subsystem attested by the developer with a reason string.
    Conditional,
    /// Any I/O, clock, randomness, network.
    Unsafe,
}

impl DeterminismClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guaranteed => "Guaranteed",
            Self::Verifiable => "Verifiable",
            Self::Conditional => "Conditional",
            Self::Unsafe => "Unsafe",
        }
    }
}

impl std::fmt::Display for DeterminismClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log level carried by timeline log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A recorded observation of a source's value at a sequence number.
///
/// Byte payloads serialize as base64 strings so the streamed JSON stays
/// compact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEvent {
    pub timestamp_ms: i64,
    pub sequence_no: u64,
    pub thread_name: String,
    pub source_id: String,
    pub class: DeterminismClass,
    pub value_type_name: String,
    #[serde(with = "b64")]
    value_bytes: Vec<u8>,
    #[serde(with = "b64_opt")]
    checkpoint_hash: Option<Vec<u8>>,
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

impl SnapshotEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp_ms: i64,
        sequence_no: u64,
        thread_name: String,
        source_id: String,
        class: DeterminismClass,
        value_type_name: String,
        value_bytes: &[u8],
        checkpoint_hash: Option<&[u8]>,
    ) -> Self {
        Self {
            timestamp_ms,
            sequence_no,
            thread_name,
            source_id,
            class,
            value_type_name,
            value_bytes: value_bytes.to_vec(),
            checkpoint_hash: checkpoint_hash.map(|h| h.to_vec()),
        }
    }

    /// Copy of the recorded value bytes.
    pub fn value_bytes(&self) -> Vec<u8> {
        self.value_bytes.clone()
    }

    /// Copy of the checkpoint hash, when one was recorded.
    pub fn checkpoint_hash(&self) -> Option<Vec<u8>> {
        self.checkpoint_hash.clone()
    }

    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint_hash.is_some()
    }
}

// Snapshot equality is (sequence_no, source_id, value_bytes).
impl PartialEq for SnapshotEvent {
    fn eq(&self, other: &Self) -> bool {
        self.sequence_no == other.sequence_no
            && self.source_id == other.source_id
            && self.value_bytes == other.value_bytes
    }
}

impl Eq for SnapshotEvent {}

/// A recorded hash over the registered source set, for replay verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEvent {
    pub timestamp_ms: i64,
    pub sequence_no: u64,
    pub thread_name: String,
    pub checkpoint_id: String,
    pub state_hash: String,
    pub source_count: usize,
}

/// A marker for intentionally missed events (overflow or degradation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapEvent {
    pub timestamp_ms: i64,
    pub sequence_no: u64,
    pub thread_name: String,
    pub reason: String,
    pub missed_count: Option<u64>,
    pub duration_ms: Option<u64>,
}

/// A log line captured into the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp_ms: i64,
    pub sequence_no: u64,
    pub thread_name: String,
    pub level: EventLogLevel,
    pub tag: String,
    pub message: String,
}

/// Timeline event union. Immutable once appended; the ring buffer only
/// overwrites by discarding whole events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimelineEvent {
    Snapshot(SnapshotEvent),
    Checkpoint(CheckpointEvent),
    Gap(GapEvent),
    Log(LogEvent),
}

impl TimelineEvent {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            Self::Snapshot(e) => e.timestamp_ms,
            Self::Checkpoint(e) => e.timestamp_ms,
            Self::Gap(e) => e.timestamp_ms,
            Self::Log(e) => e.timestamp_ms,
        }
    }

    pub fn sequence_no(&self) -> u64 {
        match self {
            Self::Snapshot(e) => e.sequence_no,
            Self::Checkpoint(e) => e.sequence_no,
            Self::Gap(e) => e.sequence_no,
            Self::Log(e) => e.sequence_no,
        }
    }

    pub fn thread_name(&self) -> &str {
        match self {
            Self::Snapshot(e) => &e.thread_name,
            Self::Checkpoint(e) => &e.thread_name,
            Self::Gap(e) => &e.thread_name,
            Self::Log(e) => &e.thread_name,
        }
    }

    /// Source id for snapshot events, None otherwise.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::Snapshot(e) => Some(&e.source_id),
            _ => None,
        }
    }

    /// Whether this is a buffer-synthesized overflow gap.
    pub fn is_overflow_gap(&self) -> bool {
        matches!(self, Self::Gap(g) if g.sequence_no == OVERFLOW_GAP_SEQUENCE)
    }

    /// Synthesize the gap that replaces an event discarded by overflow.
    pub fn overflow_gap() -> Self {
        Self::Gap(GapEvent {
            timestamp_ms: now_ms(),
            sequence_no: OVERFLOW_GAP_SEQUENCE,
            thread_name: current_thread_name(),
            reason: "buffer overflow".to_string(),
            missed_count: Some(1),
            duration_ms: None,
        })
    }
}

/// Current wall-clock time as milliseconds since Unix epoch.
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Name of the calling thread, with a stable fallback for unnamed threads.
pub fn current_thread_name() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("thread-{:?}", current.id()),
    }
}
