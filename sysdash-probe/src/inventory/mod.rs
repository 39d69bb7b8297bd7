//! Process inventory: which recognisable applications are running here
//!
//! Listing goes through a [`ProcessSource`] so the filtering and
//! classification rules can be exercised without a live process table.
//! Sources are blocking; async callers should wrap [`ProcessInventory::scan`]
//! in `spawn_blocking`.

mod ps;

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::System;
use tracing::debug;

use crate::error::{ProbeError, Result};

pub use ps::{parse_ps_output, PsCommand};

/// One row of the raw process table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawProcess {
    pub pid: u32,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub command: String,
}

/// A process that mapped onto a logical application name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedProcess {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

/// Command-line substring → application label. First match wins.
pub const CLASSIFICATION: &[(&str, &str)] = &[
    ("node", "Node.js Application"),
    ("python", "Python Application"),
    ("java", "Java Application"),
    ("nginx", "Nginx Server"),
    ("apache", "Apache Server"),
];

/// Label for unmatched processes when they are surfaced at all.
pub const UNCLASSIFIED_LABEL: &str = "Unknown Process";

/// Anything able to produce the raw process table.
pub trait ProcessSource: Send + Sync {
    fn list_processes(&self) -> Result<Vec<RawProcess>>;
}

/// Process table read through sysinfo, ordered by pid.
pub struct SysinfoProcesses {
    system: Mutex<System>,
}

impl SysinfoProcesses {
    pub fn new() -> Self {
        Self { system: Mutex::new(System::new()) }
    }
}

impl Default for SysinfoProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoProcesses {
    fn list_processes(&self) -> Result<Vec<RawProcess>> {
        let mut sys = self.system.lock();
        sys.refresh_memory();
        // CPU usage is a delta against the previous refresh, so the first
        // listing reports 0% everywhere
        sys.refresh_processes();

        let total = sys.total_memory();
        if total == 0 {
            return Err(ProbeError::InventoryUnavailable("no memory information".into()));
        }

        let mut rows: Vec<RawProcess> = sys
            .processes()
            .values()
            .map(|p| {
                let command = if p.cmd().is_empty() {
                    p.name().to_string()
                } else {
                    p.cmd().join(" ")
                };
                RawProcess {
                    pid: p.pid().as_u32(),
                    cpu_percent: p.cpu_usage(),
                    memory_percent: (p.memory() as f64 / total as f64 * 100.0) as f32,
                    command,
                }
            })
            .collect();
        rows.sort_by_key(|r| r.pid);
        Ok(rows)
    }
}

/// Platform default: `ps aux` on unix, sysinfo elsewhere.
pub fn default_source() -> Box<dyn ProcessSource> {
    if cfg!(unix) {
        Box::new(PsCommand)
    } else {
        Box::new(SysinfoProcesses::new())
    }
}

/// Keep processes doing something (`cpu > 0` or `memory > 1`), then the first
/// `limit` of those in listing order.
pub fn filter_interesting(processes: Vec<RawProcess>, limit: usize) -> Vec<RawProcess> {
    processes
        .into_iter()
        .filter(|p| p.cpu_percent > 0.0 || p.memory_percent > 1.0)
        .take(limit)
        .collect()
}

/// Application label for a command line, if any rule matches.
pub fn classify(command: &str) -> Option<&'static str> {
    CLASSIFICATION
        .iter()
        .find(|(needle, _)| command.contains(needle))
        .map(|(_, label)| *label)
}

/// Lists, filters and classifies processes.
pub struct ProcessInventory {
    source: Box<dyn ProcessSource>,
    max_processes: usize,
    include_unclassified: bool,
}

impl ProcessInventory {
    pub fn new(source: Box<dyn ProcessSource>, max_processes: usize, include_unclassified: bool) -> Self {
        Self { source, max_processes, include_unclassified }
    }

    pub fn list_processes(&self) -> Result<Vec<RawProcess>> {
        self.source.list_processes()
    }

    /// One inventory pass. Unmatched processes are dropped unless
    /// `include_unclassified` is set.
    pub fn scan(&self) -> Result<Vec<ClassifiedProcess>> {
        let listed = self.list_processes()?;
        let listed_count = listed.len();
        let interesting = filter_interesting(listed, self.max_processes);

        let classified: Vec<ClassifiedProcess> = interesting
            .into_iter()
            .filter_map(|p| {
                let label = match classify(&p.command) {
                    Some(label) => label,
                    None if self.include_unclassified => UNCLASSIFIED_LABEL,
                    None => return None,
                };
                Some(ClassifiedProcess {
                    pid: p.pid,
                    name: label.to_string(),
                    cpu_percent: p.cpu_percent,
                    memory_percent: p.memory_percent,
                })
            })
            .collect();

        debug!("inventory: {} listed, {} classified", listed_count, classified.len());
        Ok(classified)
    }
}
