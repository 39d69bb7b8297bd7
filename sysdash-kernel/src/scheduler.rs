/**
 * SCHEDULER - Periodic collection and alert cycles
 *
 * ROLE:
 * Drives the two loops (fast: collect + merge + broadcast, slow: alert
 * evaluation) and the on-demand refresh path.
 *
 * HOW IT WORKS:
 * - each loop has an Idle/Running guard checked before the body runs
 * - a tick arriving while the same loop is Running is dropped, not queued,
 *   and leaves one INFO log entry
 * - every tick runs its body in its own task so a long cycle never delays
 *   the timer; the guard, not the ticker, decides whether a body runs
 * - refresh() shares the fast guard
 */

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::alerts::AlertRules;
use crate::collector::Collect;
use crate::config::ScheduleConf;
use crate::health::{HealthTracker, LoopKind};
use crate::models::LogLevel;
use crate::state::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleOutcome {
    Completed,
    Skipped,
}

/// Idle (false) / Running (true) for one loop.
#[derive(Default)]
struct LoopGuard {
    running: AtomicBool,
}

struct RunningCycle<'a>(&'a AtomicBool);

impl LoopGuard {
    fn try_enter(&self) -> Option<RunningCycle<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningCycle(&self.running))
    }
}

impl Drop for RunningCycle<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    store: StateStore,
    collector: Box<dyn Collect>,
    rules: AlertRules,
    health: HealthTracker,
    fast: LoopGuard,
    slow: LoopGuard,
    fast_interval: Duration,
    slow_interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: StateStore,
        collector: Box<dyn Collect>,
        rules: AlertRules,
        health: HealthTracker,
        schedule: &ScheduleConf,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                collector,
                rules,
                health,
                fast: LoopGuard::default(),
                slow: LoopGuard::default(),
                fast_interval: schedule.fast_interval(),
                slow_interval: schedule.slow_interval(),
            }),
        }
    }

    /// Collect, merge, broadcast `all`. Skipped if a fast cycle is running.
    pub async fn run_fast_cycle(&self) -> CycleOutcome {
        let inner = &self.inner;
        let Some(_running) = inner.fast.try_enter() else {
            inner
                .store
                .log(LogLevel::Info, "Skipped data collection cycle: previous cycle still running");
            inner.health.record_skipped(LoopKind::Fast);
            return CycleOutcome::Skipped;
        };

        debug!("collecting system data");
        let readings = inner.collector.collect().await;
        inner.store.apply_cycle(readings);
        inner.health.record_completed(LoopKind::Fast);
        debug!("system data collection completed");
        CycleOutcome::Completed
    }

    /// On-demand path: the fast body, awaited by the caller.
    pub async fn refresh(&self) -> CycleOutcome {
        self.run_fast_cycle().await
    }

    /// Evaluate alert rules on the current snapshot and record the results.
    pub fn run_slow_cycle(&self) -> CycleOutcome {
        let inner = &self.inner;
        let Some(_running) = inner.slow.try_enter() else {
            inner
                .store
                .log(LogLevel::Info, "Skipped alert evaluation cycle: previous cycle still running");
            inner.health.record_skipped(LoopKind::Slow);
            return CycleOutcome::Skipped;
        };

        let snapshot = inner.store.snapshot();
        for alert in inner.rules.evaluate(&snapshot) {
            let message = alert.message.clone();
            inner.store.append_alert(alert);
            inner.store.log(LogLevel::Warn, format!("Alert generated: {message}"));
        }
        inner.health.record_completed(LoopKind::Slow);
        CycleOutcome::Completed
    }

    /// Start both loops. The fast loop fires immediately, the slow loop after
    /// its first full interval.
    pub fn spawn_loops(&self) -> Vec<JoinHandle<()>> {
        let fast = {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let mut ticker = interval(scheduler.inner.fast_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let scheduler = scheduler.clone();
                    tokio::spawn(async move {
                        scheduler.run_fast_cycle().await;
                    });
                }
            })
        };

        let slow = {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let period = scheduler.inner.slow_interval;
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let scheduler = scheduler.clone();
                    tokio::spawn(async move {
                        scheduler.run_slow_cycle();
                    });
                }
            })
        };

        vec![fast, slow]
    }
}
