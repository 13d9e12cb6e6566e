//! Recording State Cell
//!
//! The recording level and the per-second event counter live together in a
//! single atomically swapped record. All mutation goes through a
//! compare-and-swap loop; there are no locks on the capture path.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::DegradationThresholds;
use crate::timeline::DeterminismClass;

/// Recording level of the degradation ladder, most permissive first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RecordingLevel {
    Full,
    Reduced,
    Minimal,
    Paused,
}

impl RecordingLevel {
    /// Whether a source of the given class is recorded at this level.
    pub fn records(&self, class: DeterminismClass) -> bool {
        match self {
            Self::Full => true,
            Self::Reduced => class != DeterminismClass::Conditional,
            Self::Minimal => class == DeterminismClass::Guaranteed,
            Self::Paused => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "Full",
            Self::Reduced => "Reduced",
            Self::Minimal => "Minimal",
            Self::Paused => "Paused",
        }
    }
}

impl std::fmt::Display for RecordingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic record: level plus the event counter for the current
/// wall-clock second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingState {
    pub level: RecordingLevel,
    pub events_this_second: u64,
    pub second_bucket_ts: i64,
}

impl RecordingState {
    fn initial() -> Self {
        Self {
            level: RecordingLevel::Full,
            events_this_second: 0,
            second_bucket_ts: 0,
        }
    }
}

/// Lock-free holder for the recording state.
pub struct RecordingStateCell {
    inner: ArcSwap<RecordingState>,
}

impl RecordingStateCell {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(RecordingState::initial()),
        }
    }

    pub fn load(&self) -> RecordingState {
        **self.inner.load()
    }

    pub fn level(&self) -> RecordingLevel {
        self.inner.load().level
    }

    /// Account one capture at wall-clock second `now_sec` and apply the
    /// degradation ladder. Returns `(previous, new)` state. Demotion is
    /// one-way; only `set_level` can promote.
    pub fn advance(
        &self,
        now_sec: i64,
        thresholds: &DegradationThresholds,
    ) -> (RecordingState, RecordingState) {
        let prev = self
            .inner
            .rcu(|cur| transition(cur, now_sec, thresholds));
        let new = transition(&prev, now_sec, thresholds);
        (*prev, new)
    }

    /// Force a level, keeping the current bucket counter.
    pub fn set_level(&self, level: RecordingLevel) {
        self.inner.rcu(|cur| RecordingState {
            level,
            events_this_second: cur.events_this_second,
            second_bucket_ts: cur.second_bucket_ts,
        });
    }
}

impl Default for RecordingStateCell {
    fn default() -> Self {
        Self::new()
    }
}

fn transition(
    cur: &Arc<RecordingState>,
    now_sec: i64,
    thresholds: &DegradationThresholds,
) -> RecordingState {
    let count = if cur.second_bucket_ts == now_sec {
        cur.events_this_second + 1
    } else {
        1
    };

    let ladder = if count > thresholds.paused {
        RecordingLevel::Paused
    } else if count > thresholds.minimal {
        RecordingLevel::Minimal
    } else if count > thresholds.reduced {
        RecordingLevel::Reduced
    } else {
        RecordingLevel::Full
    };

    RecordingState {
        // One-way: keep whichever of (current, ladder) is more degraded.
        level: cur.level.max(ladder),
        events_this_second: count,
        second_bucket_ts: now_sec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> DegradationThresholds {
        DegradationThresholds::default()
    }

    #[test]
    fn test_counter_resets_on_new_bucket() {
        let cell = RecordingStateCell::new();
        let (_, state) = cell.advance(100, &thresholds());
        assert_eq!(state.events_this_second, 1);
        let (_, state) = cell.advance(100, &thresholds());
        assert_eq!(state.events_this_second, 2);
        let (_, state) = cell.advance(101, &thresholds());
        assert_eq!(state.events_this_second, 1);
    }

    #[test]
    fn test_ladder_demotes_at_thresholds() {
        let cell = RecordingStateCell::new();
        for _ in 0..200 {
            cell.advance(100, &thresholds());
        }
        assert_eq!(cell.level(), RecordingLevel::Full);

        let (prev, state) = cell.advance(100, &thresholds());
        assert_eq!(prev.level, RecordingLevel::Full);
        assert_eq!(state.level, RecordingLevel::Reduced);

        for _ in 0..300 {
            cell.advance(100, &thresholds());
        }
        assert_eq!(cell.level(), RecordingLevel::Minimal);

        for _ in 0..500 {
            cell.advance(100, &thresholds());
        }
        assert_eq!(cell.level(), RecordingLevel::Paused);
    }

    #[test]
    fn test_demotion_is_one_way_across_buckets() {
        let cell = RecordingStateCell::new();
        for _ in 0..=200 {
            cell.advance(100, &thresholds());
        }
        assert_eq!(cell.level(), RecordingLevel::Reduced);

        // New second: the counter resets but the level stays demoted.
        let (_, state) = cell.advance(101, &thresholds());
        assert_eq!(state.events_this_second, 1);
        assert_eq!(state.level, RecordingLevel::Reduced);

        cell.set_level(RecordingLevel::Full);
        assert_eq!(cell.level(), RecordingLevel::Full);
    }

    #[test]
    fn test_level_gating_by_class() {
        use DeterminismClass::*;
        assert!(RecordingLevel::Full.records(Conditional));
        assert!(RecordingLevel::Full.records(Unsafe));
        assert!(!RecordingLevel::Reduced.records(Conditional));
        assert!(RecordingLevel::Reduced.records(Verifiable));
        assert!(RecordingLevel::Minimal.records(Guaranteed));
        assert!(!RecordingLevel::Minimal.records(Verifiable));
        assert!(!RecordingLevel::Paused.records(Guaranteed));
    }

    #[test]
    fn test_concurrent_advances_count_exactly() {
        use std::sync::Arc;
        let cell = Arc::new(RecordingStateCell::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        cell.advance(42, &DegradationThresholds::default());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cell.load().events_this_second, 400);
    }
}
