//! Memory Pressure Monitor
//!
//! Polls system memory through sysinfo and pauses recording when available
//! memory falls below the pause threshold, resuming with hysteresis once it
//! recovers. External signals (OS low-memory callbacks, critical trim
//! levels) force a pause regardless of the polled ratio.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::{info, warn};

use crate::config::MemoryThresholds;
use crate::metrics::AgentStats;

/// Trim levels at or above this value count as critical.
pub const CRITICAL_TRIM_LEVEL: u32 = 15;

/// Observer of pause/resume transitions.
pub trait MemoryPressureListener: Send + Sync {
    fn on_paused(&self, reason: &str);
    fn on_resumed(&self, paused_for: Duration);
}

/// External-signal plus polled-threshold recording gate.
pub struct MemoryPressureMonitor {
    thresholds: MemoryThresholds,
    poll_interval: Duration,
    paused: AtomicBool,
    pause_count: AtomicU64,
    paused_since: Mutex<Option<Instant>>,
    total_paused: Mutex<Duration>,
    listeners: RwLock<Vec<Arc<dyn MemoryPressureListener>>>,
    stats: Arc<AgentStats>,
    system: Mutex<System>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryPressureMonitor {
    pub fn new(
        thresholds: MemoryThresholds,
        poll_interval: Duration,
        stats: Arc<AgentStats>,
    ) -> Self {
        Self {
            thresholds,
            poll_interval,
            paused: AtomicBool::new(false),
            pause_count: AtomicU64::new(0),
            paused_since: Mutex::new(None),
            total_paused: Mutex::new(Duration::ZERO),
            listeners: RwLock::new(Vec::new()),
            stats,
            system: Mutex::new(System::new_with_specifics(
                RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
            )),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn MemoryPressureListener>) {
        self.listeners.write().push(listener);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn pause_count(&self) -> u64 {
        self.pause_count.load(Ordering::Relaxed)
    }

    /// Total time spent paused, including the current pause if any.
    pub fn total_paused_duration(&self) -> Duration {
        let accumulated = *self.total_paused.lock();
        match *self.paused_since.lock() {
            Some(since) => accumulated + since.elapsed(),
            None => accumulated,
        }
    }

    /// Poll system memory once and apply the thresholds. Returns the
    /// available/total ratio observed.
    pub fn check_now(&self) -> f64 {
        let ratio = {
            let mut system = self.system.lock();
            system.refresh_memory();
            let total = system.total_memory();
            if total == 0 {
                return 1.0;
            }
            system.available_memory() as f64 / total as f64
        };
        self.apply_ratio(ratio);
        ratio
    }

    /// OS low-memory callback: force a pause.
    pub fn on_low_memory_signal(&self) {
        self.pause("OS low-memory signal");
    }

    /// Component trim callback: critical levels force a pause.
    pub fn on_trim_level(&self, level: u32) {
        if level >= CRITICAL_TRIM_LEVEL {
            self.pause("critical trim level");
        }
    }

    /// Start the background polling thread.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let monitor = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("chronos-memmon".to_string())
            .spawn(move || {
                while monitor.running.load(Ordering::SeqCst) {
                    std::thread::sleep(monitor.poll_interval);
                    if !monitor.running.load(Ordering::SeqCst) {
                        break;
                    }
                    monitor.check_now();
                }
            })
            .expect("spawn memory monitor thread");
        *self.handle.lock() = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    fn apply_ratio(&self, ratio: f64) {
        if !self.is_paused() && ratio < self.thresholds.pause_below {
            self.pause("available memory below pause threshold");
        } else if self.is_paused() && ratio > self.thresholds.resume_above {
            self.resume();
        }
    }

    fn pause(&self, reason: &str) {
        if self.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pause_count.fetch_add(1, Ordering::Relaxed);
        AgentStats::incr(&self.stats.memory_pauses);
        *self.paused_since.lock() = Some(Instant::now());
        warn!(reason, "recording paused under memory pressure");

        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            listener.on_paused(reason);
        }
    }

    fn resume(&self) {
        if !self.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        let paused_for = self
            .paused_since
            .lock()
            .take()
            .map(|since| since.elapsed())
            .unwrap_or_default();
        *self.total_paused.lock() += paused_for;
        info!(paused_ms = paused_for.as_millis() as u64, "recording resumed");

        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            listener.on_resumed(paused_for);
        }
    }
}

impl Drop for MemoryPressureMonitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> MemoryPressureMonitor {
        MemoryPressureMonitor::new(
            MemoryThresholds::default(),
            Duration::from_millis(10),
            Arc::new(AgentStats::new()),
        )
    }

    #[test]
    fn test_hysteresis_transitions() {
        let monitor = monitor();
        assert!(!monitor.is_paused());

        monitor.apply_ratio(0.10);
        assert!(monitor.is_paused());
        assert_eq!(monitor.pause_count(), 1);

        // Between the thresholds: stays paused.
        monitor.apply_ratio(0.20);
        assert!(monitor.is_paused());

        monitor.apply_ratio(0.30);
        assert!(!monitor.is_paused());

        // Repeating a resume ratio does not double-count.
        monitor.apply_ratio(0.30);
        assert_eq!(monitor.pause_count(), 1);
    }

    #[test]
    fn test_external_signals_force_pause() {
        let monitor = monitor();
        monitor.on_low_memory_signal();
        assert!(monitor.is_paused());

        let monitor = self::monitor();
        monitor.on_trim_level(CRITICAL_TRIM_LEVEL - 1);
        assert!(!monitor.is_paused());
        monitor.on_trim_level(CRITICAL_TRIM_LEVEL);
        assert!(monitor.is_paused());
    }

    #[test]
    fn test_listeners_and_pause_accounting() {
        use parking_lot::Mutex as PlMutex;

        struct Observing {
            pauses: PlMutex<Vec<String>>,
            resumes: AtomicU64,
        }
        impl MemoryPressureListener for Observing {
            fn on_paused(&self, reason: &str) {
                self.pauses.lock().push(reason.to_string());
            }
            fn on_resumed(&self, _paused_for: Duration) {
                self.resumes.fetch_add(1, Ordering::Relaxed);
            }
        }

        let monitor = monitor();
        let listener = Arc::new(Observing {
            pauses: PlMutex::new(Vec::new()),
            resumes: AtomicU64::new(0),
        });
        monitor.add_listener(listener.clone());

        monitor.apply_ratio(0.05);
        std::thread::sleep(Duration::from_millis(5));
        monitor.apply_ratio(0.50);

        assert_eq!(listener.pauses.lock().len(), 1);
        assert_eq!(listener.resumes.load(Ordering::Relaxed), 1);
        assert!(monitor.total_paused_duration() >= Duration::from_millis(5));
    }

    #[test]
    fn test_check_now_reports_ratio() {
        let monitor = monitor();
        let ratio = monitor.check_now();
        assert!((0.0..=1.0).contains(&ratio));
    }
}
