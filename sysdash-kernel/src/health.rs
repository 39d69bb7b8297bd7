use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

use crate::state::{new_state, Shared, StateStore};

/// Which scheduled loop a cycle belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopKind {
    Fast,
    Slow,
}

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub subscribers: usize,
    pub servers_tracked: usize,
    pub fast_cycles_completed: u64,
    pub fast_cycles_skipped: u64,
    pub slow_cycles_completed: u64,
    pub slow_cycles_skipped: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_fast_cycle: Option<OffsetDateTime>,
    pub memory_usage_mb: f32,
}

#[derive(Default)]
struct CycleCounters {
    fast_completed: AtomicU64,
    fast_skipped: AtomicU64,
    slow_completed: AtomicU64,
    slow_skipped: AtomicU64,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    counters: Arc<CycleCounters>,
    last_fast_cycle: Shared<Option<OffsetDateTime>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(CycleCounters::default()),
            last_fast_cycle: new_state(None),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.start_time
    }

    pub fn record_completed(&self, kind: LoopKind) {
        match kind {
            LoopKind::Fast => {
                self.counters.fast_completed.fetch_add(1, Ordering::Relaxed);
                *self.last_fast_cycle.lock() = Some(OffsetDateTime::now_utc());
            }
            LoopKind::Slow => {
                self.counters.slow_completed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_skipped(&self, kind: LoopKind) {
        let counter = match kind {
            LoopKind::Fast => &self.counters.fast_skipped,
            LoopKind::Slow => &self.counters.slow_skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, store: &StateStore) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            subscribers: store.hub().subscriber_count(),
            servers_tracked: store.servers().len(),
            fast_cycles_completed: self.counters.fast_completed.load(Ordering::Relaxed),
            fast_cycles_skipped: self.counters.fast_skipped.load(Ordering::Relaxed),
            slow_cycles_completed: self.counters.slow_completed.load(Ordering::Relaxed),
            slow_cycles_skipped: self.counters.slow_skipped.load(Ordering::Relaxed),
            last_fast_cycle: *self.last_fast_cycle.lock(),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Resident set size of this process, 0 where unknown.
fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(Ok(kb)) = rest.split_whitespace().next().map(str::parse::<u64>) {
                        return kb as f32 / 1024.0;
                    }
                }
            }
        }
    }

    0.0
}
