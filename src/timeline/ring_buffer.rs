//! Bounded Event Ring Buffer
//!
//! Fixed-capacity FIFO store for timeline events. When full, the oldest
//! retained event is discarded and a synthesized overflow gap takes its
//! place, so a reader can always tell that history was lost. Overflow gaps
//! do not count against capacity; they accumulate as a prefix ahead of the
//! retained window and are themselves discarded once they would double the
//! buffer footprint.
//!
//! Reader-writer discipline: multiple concurrent readers, exclusive writer.
//! All read operations return point-in-time copies in chronological order.

use std::collections::VecDeque;

use parking_lot::RwLock;
use serde::Serialize;

use super::event::TimelineEvent;

/// Smallest capacity the agent configuration will accept.
pub const MIN_CAPACITY: usize = 100;

/// Capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Point-in-time counters for the buffer.
#[derive(Debug, Clone, Serialize)]
pub struct BufferStats {
    pub size: usize,
    pub capacity: usize,
    pub overflow_count: u64,
    pub total_appended: u64,
}

struct RingInner {
    events: VecDeque<TimelineEvent>,
    /// Retained appended events. Synthesized overflow gaps are excluded.
    size: usize,
    overflow_count: u64,
    total_appended: u64,
}

/// Thread-safe bounded event store with overflow gap insertion.
pub struct EventRingBuffer {
    capacity: usize,
    inner: RwLock<RingInner>,
}

impl EventRingBuffer {
    /// Create a buffer holding at most `capacity` appended events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: RwLock::new(RingInner {
                events: VecDeque::with_capacity(capacity),
                size: 0,
                overflow_count: 0,
                total_appended: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event, discarding the oldest retained event when full.
    /// Returns true when an old event was overwritten.
    pub fn append(&self, event: TimelineEvent) -> bool {
        let mut inner = self.inner.write();
        inner.total_appended += 1;

        let overwrote = if inner.size == self.capacity {
            // The oldest retained event sits right after the overflow-gap
            // prefix. Replace it in place so the loss stays visible.
            let evict_at = inner
                .events
                .iter()
                .position(|e| !e.is_overflow_gap())
                .expect("full buffer holds at least one retained event");
            inner.events[evict_at] = TimelineEvent::overflow_gap();
            inner.overflow_count += 1;
            inner.size -= 1;
            true
        } else {
            false
        };

        inner.events.push_back(event);
        inner.size += 1;

        // Cap the gap prefix so sustained overflow cannot grow the buffer
        // beyond twice its capacity.
        while inner.events.len() > self.capacity * 2 {
            let front_is_gap = inner
                .events
                .front()
                .map(TimelineEvent::is_overflow_gap)
                .unwrap_or(false);
            if !front_is_gap {
                break;
            }
            inner.events.pop_front();
        }

        overwrote
    }

    /// Retained appended events (overflow gaps excluded).
    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn overflow_count(&self) -> u64 {
        self.inner.read().overflow_count
    }

    pub fn total_appended(&self) -> u64 {
        self.inner.read().total_appended
    }

    pub fn stats(&self) -> BufferStats {
        let inner = self.inner.read();
        BufferStats {
            size: inner.size,
            capacity: self.capacity,
            overflow_count: inner.overflow_count,
            total_appended: inner.total_appended,
        }
    }

    /// All events (including overflow gap markers) in chronological order.
    pub fn get_all(&self) -> Vec<TimelineEvent> {
        self.inner.read().events.iter().cloned().collect()
    }

    /// Events with `from <= sequence_no <= to`, in chronological order.
    ///
    /// Events are stored unordered by sequence in memory (the deque cycles),
    /// so this is a linear scan over the chronological traversal.
    pub fn get_range(&self, from: u64, to: u64) -> Vec<TimelineEvent> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| !e.is_overflow_gap() && e.sequence_no() >= from && e.sequence_no() <= to)
            .cloned()
            .collect()
    }

    /// The most recent `n` events, in chronological order.
    pub fn get_recent(&self, n: usize) -> Vec<TimelineEvent> {
        let inner = self.inner.read();
        let skip = inner.events.len().saturating_sub(n);
        inner.events.iter().skip(skip).cloned().collect()
    }

    /// Snapshot events recorded for a single source, in chronological order.
    pub fn get_by_source(&self, source_id: &str) -> Vec<TimelineEvent> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| e.source_id() == Some(source_id))
            .cloned()
            .collect()
    }

    /// Drop all events and reset counters.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.events.clear();
        inner.size = 0;
        inner.overflow_count = 0;
        inner.total_appended = 0;
    }
}

impl Default for EventRingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::event::{now_ms, DeterminismClass, SnapshotEvent};
    use std::sync::Arc;

    fn snapshot(seq: u64) -> TimelineEvent {
        TimelineEvent::Snapshot(SnapshotEvent::new(
            now_ms(),
            seq,
            "test".to_string(),
            "source-a".to_string(),
            DeterminismClass::Guaranteed,
            "test::Value".to_string(),
            seq.to_string().as_bytes(),
            None,
        ))
    }

    #[test]
    fn test_append_within_capacity() {
        let buffer = EventRingBuffer::new(10);
        for seq in 1..=5 {
            assert!(!buffer.append(snapshot(seq)));
        }
        assert_eq!(buffer.size(), 5);
        assert_eq!(buffer.overflow_count(), 0);
        let all = buffer.get_all();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].sequence_no(), 1);
        assert_eq!(all[4].sequence_no(), 5);
    }

    #[test]
    fn test_overflow_inserts_gap_markers() {
        let buffer = EventRingBuffer::new(10);
        for seq in 1..=15 {
            buffer.append(snapshot(seq));
        }

        assert_eq!(buffer.size(), 10);
        assert_eq!(buffer.overflow_count(), 5);
        assert_eq!(buffer.total_appended(), 15);

        let all = buffer.get_all();
        for event in &all[..5] {
            assert!(event.is_overflow_gap(), "expected overflow gap, got {event:?}");
        }
        let retained: Vec<u64> = all[5..].iter().map(|e| e.sequence_no()).collect();
        assert_eq!(retained, (6..=15).collect::<Vec<u64>>());
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let buffer = EventRingBuffer::new(100);
        for seq in 1..=1000 {
            buffer.append(snapshot(seq));
            assert!(buffer.size() <= 100);
        }
        assert_eq!(buffer.overflow_count() + buffer.size() as u64, 1000);
    }

    #[test]
    fn test_sustained_overflow_bounds_footprint() {
        let buffer = EventRingBuffer::new(100);
        for seq in 1..=10_000 {
            buffer.append(snapshot(seq));
        }
        assert!(buffer.get_all().len() <= 200);
        assert_eq!(buffer.size(), 100);
    }

    #[test]
    fn test_get_range_filters_by_sequence() {
        let buffer = EventRingBuffer::new(100);
        for seq in 1..=50 {
            buffer.append(snapshot(seq));
        }
        let range = buffer.get_range(10, 20);
        assert_eq!(range.len(), 11);
        assert_eq!(range.first().unwrap().sequence_no(), 10);
        assert_eq!(range.last().unwrap().sequence_no(), 20);
    }

    #[test]
    fn test_get_recent_returns_tail() {
        let buffer = EventRingBuffer::new(100);
        for seq in 1..=50 {
            buffer.append(snapshot(seq));
        }
        let recent = buffer.get_recent(3);
        let seqs: Vec<u64> = recent.iter().map(|e| e.sequence_no()).collect();
        assert_eq!(seqs, vec![48, 49, 50]);
    }

    #[test]
    fn test_get_by_source() {
        let buffer = EventRingBuffer::new(100);
        buffer.append(snapshot(1));
        buffer.append(TimelineEvent::Snapshot(SnapshotEvent::new(
            now_ms(),
            2,
            "test".to_string(),
            "source-b".to_string(),
            DeterminismClass::Verifiable,
            "test::Other".to_string(),
            b"x",
            None,
        )));
        buffer.append(snapshot(3));

        let for_a = buffer.get_by_source("source-a");
        assert_eq!(for_a.len(), 2);
        assert_eq!(buffer.get_by_source("source-b").len(), 1);
        assert!(buffer.get_by_source("missing").is_empty());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let buffer = Arc::new(EventRingBuffer::new(500));
        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for seq in 1..=2000 {
                    buffer.append(snapshot(seq));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let all = buffer.get_all();
                        // A coherent window: retained events are in order.
                        let seqs: Vec<u64> = all
                            .iter()
                            .filter(|e| !e.is_overflow_gap())
                            .map(|e| e.sequence_no())
                            .collect();
                        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(buffer.size(), 500);
    }
}
