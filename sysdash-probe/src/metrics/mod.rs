//! System metrics sampling for the dashboard kernel
//!
//! Provides the three readings the fast cycle needs:
//! - CPU busy percentage over a short window (tick delta)
//! - Memory usage percentage
//! - Network reading (probed latency, placeholder traffic)

pub mod cpu;
pub mod network;

use parking_lot::Mutex;
use std::io::ErrorKind;
use std::time::Duration;
use sysinfo::System;
use tracing::debug;

use crate::error::{ProbeError, Result};

pub use cpu::{cpu_percent, CpuTicks, ProcStat, TickSource};
pub use network::{placeholder_traffic, probe_reachability, NetworkReading, NetworkSample};

/// Takes point-in-time readings of the local host.
pub struct MetricSampler {
    system: Mutex<System>,
    ticks: Box<dyn TickSource>,
    cpu_window: Duration,
    probe_target: String,
    probe_timeout: Duration,
}

impl MetricSampler {
    pub fn new(cpu_window: Duration, probe_target: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            system: Mutex::new(System::new()),
            ticks: Box::new(ProcStat),
            cpu_window,
            probe_target: probe_target.into(),
            probe_timeout,
        }
    }

    /// Replace where CPU tick counters are read from.
    pub fn with_tick_source(mut self, ticks: Box<dyn TickSource>) -> Self {
        self.ticks = ticks;
        self
    }

    /// Busy percentage across all cores, measured over `cpu_window`.
    ///
    /// Reads the tick counters twice. A source that reports `Unsupported`
    /// (non-linux) falls back to sysinfo's own usage figure; any other
    /// failed reading is returned as `ProbeError::Sampling`.
    pub async fn sample_cpu(&self) -> Result<f32> {
        let start = match self.ticks.read_ticks() {
            Ok(ticks) => ticks,
            Err(ProbeError::Io(e)) if e.kind() == ErrorKind::Unsupported => {
                debug!("tick counters unavailable ({}), using sysinfo", e);
                return Ok(self.sample_cpu_sysinfo().await);
            }
            Err(e) => return Err(ProbeError::Sampling(format!("first CPU reading: {e}"))),
        };

        tokio::time::sleep(self.cpu_window).await;

        let end = self
            .ticks
            .read_ticks()
            .map_err(|e| ProbeError::Sampling(format!("second CPU reading: {e}")))?;
        Ok(cpu_percent(start, end))
    }

    async fn sample_cpu_sysinfo(&self) -> f32 {
        self.system.lock().refresh_cpu_usage();
        // sysinfo needs a minimum gap between refreshes for a meaningful delta
        tokio::time::sleep(self.cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
        let mut sys = self.system.lock();
        sys.refresh_cpu_usage();
        sys.global_cpu_info().cpu_usage().round().clamp(0.0, 100.0)
    }

    /// Used share of physical memory, rounded to a whole percent.
    pub fn sample_memory(&self) -> f32 {
        let mut sys = self.system.lock();
        sys.refresh_memory();
        memory_percent(sys.total_memory(), sys.available_memory())
    }

    /// Probe once for latency; a failed probe reports 0 ms and is handed back
    /// alongside the reading instead of failing the sample.
    pub async fn sample_network(&self) -> NetworkSample {
        let (latency_ms, failure) =
            match probe_reachability(&self.probe_target, self.probe_timeout).await {
                Ok(rtt) => (rtt, None),
                Err(e) => (0.0, Some(e)),
            };
        let reading = placeholder_traffic(&mut rand::rng(), latency_ms);
        NetworkSample { reading, failure }
    }
}

/// `(total - free) / total * 100`, rounded. An empty total reads as 0.
pub fn memory_percent(total: u64, free: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(free);
    ((used as f64 / total as f64) * 100.0).round() as f32
}

/// Seconds since the host booted.
pub fn host_uptime_secs() -> u64 {
    System::uptime()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_ratio_rounds() {
        assert_eq!(memory_percent(1000, 250), 75.0);
        assert_eq!(memory_percent(3, 2), 33.0);
        assert_eq!(memory_percent(8, 0), 100.0);
    }

    #[test]
    fn memory_with_no_total() {
        assert_eq!(memory_percent(0, 0), 0.0);
    }

    #[tokio::test]
    async fn live_cpu_and_memory_in_range() {
        let sampler = MetricSampler::new(Duration::from_millis(100), "127.0.0.1:9", Duration::from_millis(200));
        let cpu = sampler.sample_cpu().await.unwrap();
        assert!((0.0..=100.0).contains(&cpu));
        let mem = sampler.sample_memory();
        assert!((0.0..=100.0).contains(&mem));
    }

    #[tokio::test]
    async fn failed_probe_degrades_to_zero_latency() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let sampler = MetricSampler::new(
            Duration::from_millis(100),
            format!("127.0.0.1:{port}"),
            Duration::from_millis(500),
        );
        let sample = sampler.sample_network().await;
        assert_eq!(sample.reading.latency_ms, 0.0);
        assert!(sample.failure.is_some());
        assert!(sample.reading.bandwidth_mbps >= 500);
    }

    /// Hands out scripted readings in order.
    struct ScriptedTicks(Mutex<Vec<Result<CpuTicks>>>);

    impl ScriptedTicks {
        fn new(mut readings: Vec<Result<CpuTicks>>) -> Box<Self> {
            readings.reverse();
            Box::new(Self(Mutex::new(readings)))
        }
    }

    impl TickSource for ScriptedTicks {
        fn read_ticks(&self) -> Result<CpuTicks> {
            self.0
                .lock()
                .pop()
                .unwrap_or_else(|| Err(ProbeError::Io(std::io::Error::other("no more readings"))))
        }
    }

    fn sampler_with(ticks: Box<ScriptedTicks>) -> MetricSampler {
        MetricSampler::new(Duration::from_millis(10), "127.0.0.1:9", Duration::from_millis(100))
            .with_tick_source(ticks)
    }

    #[tokio::test]
    async fn cpu_from_scripted_ticks() {
        let sampler = sampler_with(ScriptedTicks::new(vec![
            Ok(CpuTicks { idle: 100, total: 200 }),
            Ok(CpuTicks { idle: 140, total: 300 }),
        ]));
        assert_eq!(sampler.sample_cpu().await.unwrap(), 60.0);
    }

    #[tokio::test]
    async fn failed_second_reading_is_an_error() {
        let sampler = sampler_with(ScriptedTicks::new(vec![
            Ok(CpuTicks { idle: 100, total: 200 }),
            Err(ProbeError::Io(std::io::Error::other("malformed /proc/stat"))),
        ]));
        let err = sampler.sample_cpu().await.unwrap_err();
        assert!(matches!(err, ProbeError::Sampling(_)));
        assert!(err.to_string().contains("second CPU reading"));
    }

    #[tokio::test]
    async fn failed_first_reading_is_an_error() {
        let sampler = sampler_with(ScriptedTicks::new(vec![Err(ProbeError::Io(std::io::Error::new(
            ErrorKind::PermissionDenied,
            "/proc/stat",
        )))]));
        assert!(matches!(sampler.sample_cpu().await, Err(ProbeError::Sampling(_))));
    }

    #[tokio::test]
    async fn unsupported_counters_fall_back_to_sysinfo() {
        let sampler = sampler_with(ScriptedTicks::new(vec![Err(ProbeError::Io(std::io::Error::new(
            ErrorKind::Unsupported,
            "no tick counters",
        )))]));
        let cpu = sampler.sample_cpu().await.unwrap();
        assert!((0.0..=100.0).contains(&cpu));
    }
}
