//! CPU busy percentage from two cumulative tick readings

use crate::error::{ProbeError, Result};

/// Cumulative CPU time counters, summed over all cores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub idle: u64,
    pub total: u64,
}

impl CpuTicks {
    /// Parse the aggregate `cpu` line of `/proc/stat`.
    ///
    /// Columns: user nice system idle iowait irq softirq steal [guest guest_nice].
    /// Guest time is already accounted in user/nice, so only the first eight
    /// columns count towards the total. iowait counts as idle.
    pub fn parse_proc_stat(text: &str) -> Option<Self> {
        let line = text.lines().find(|l| l.starts_with("cpu "))?;
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .take(8)
            .map(|f| f.parse().ok())
            .collect::<Option<_>>()?;
        if fields.len() < 4 {
            return None;
        }
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        let total = fields.iter().sum();
        Some(Self { idle, total })
    }
}

/// `100 - idle/total * 100` over the delta between two readings, rounded and
/// clamped to [0, 100]. A zero (or backwards) total delta yields 0.
pub fn cpu_percent(start: CpuTicks, end: CpuTicks) -> f32 {
    let total = end.total.saturating_sub(start.total);
    if total == 0 {
        return 0.0;
    }
    let idle = end.idle.saturating_sub(start.idle);
    let busy = 100.0 - (idle as f64 / total as f64) * 100.0;
    busy.round().clamp(0.0, 100.0) as f32
}

/// Anything able to report the cumulative tick counters.
pub trait TickSource: Send + Sync {
    fn read_ticks(&self) -> Result<CpuTicks>;
}

/// Counters from `/proc/stat`. Reports `Unsupported` off linux.
pub struct ProcStat;

impl TickSource for ProcStat {
    fn read_ticks(&self) -> Result<CpuTicks> {
        read_ticks()
    }
}

/// Read the current tick counters from the kernel.
#[cfg(target_os = "linux")]
pub fn read_ticks() -> Result<CpuTicks> {
    let text = std::fs::read_to_string("/proc/stat")?;
    CpuTicks::parse_proc_stat(&text)
        .ok_or_else(|| ProbeError::Io(std::io::Error::other("malformed /proc/stat")))
}

#[cfg(not(target_os = "linux"))]
pub fn read_ticks() -> Result<CpuTicks> {
    Err(ProbeError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "tick counters only available on linux",
    )))
}
