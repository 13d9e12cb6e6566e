//! Event timeline: the event model and its bounded ring-buffer store.

mod event;
mod ring_buffer;

pub use event::{
    current_thread_name, now_ms, CheckpointEvent, DeterminismClass, EventLogLevel, GapEvent,
    LogEvent, SnapshotEvent, TimelineEvent, OVERFLOW_GAP_SEQUENCE,
};
pub use ring_buffer::{BufferStats, EventRingBuffer, DEFAULT_CAPACITY, MIN_CAPACITY};
