//! Fast-cycle body: take every host reading the store needs.
//!
//! The scheduler only sees the [`Collect`] trait, so cycles can be driven by
//! a scripted collector in tests.

use futures::future::BoxFuture;
use std::sync::Arc;
use sysdash_probe::{ClassifiedProcess, MetricSampler, ProcessInventory};
use time::OffsetDateTime;

use crate::models::{
    AppStatus, ApplicationRecord, NetworkSnapshot, ServerMetricsUpdate, DERIVED_APP_PREFIX, LOCAL_SERVER_ID,
};
use crate::state::CycleReadings;

pub trait Collect: Send + Sync {
    /// One complete collection pass. Never fails as a whole: partial
    /// failures are reported in `CycleReadings::errors`.
    fn collect(&self) -> BoxFuture<'_, CycleReadings>;
}

/// Collects from the local host through the probe crate.
pub struct HostCollector {
    sampler: MetricSampler,
    inventory: Arc<ProcessInventory>,
}

impl HostCollector {
    pub fn new(sampler: MetricSampler, inventory: ProcessInventory) -> Self {
        Self { sampler, inventory: Arc::new(inventory) }
    }

    async fn run(&self) -> CycleReadings {
        let mut errors = Vec::new();

        // a failed CPU sample leaves the last good value in the store
        let cpu = match self.sampler.sample_cpu().await {
            Ok(cpu) => Some(cpu),
            Err(e) => {
                errors.push(format!("CPU sampling failed: {e}"));
                None
            }
        };
        let memory = self.sampler.sample_memory();
        let server = ServerMetricsUpdate {
            cpu_percent: cpu,
            memory_percent: Some(memory),
            uptime_seconds: Some(sysdash_probe::metrics::host_uptime_secs()),
            last_updated: Some(OffsetDateTime::now_utc()),
            ..Default::default()
        };

        // process listing blocks (ps / sysinfo), keep it off the runtime threads
        let inventory = Arc::clone(&self.inventory);
        let applications = match tokio::task::spawn_blocking(move || inventory.scan()).await {
            Ok(Ok(processes)) => Some(processes.into_iter().map(derived_application).collect()),
            Ok(Err(e)) => {
                errors.push(format!("Process inventory skipped: {e}"));
                None
            }
            Err(e) => {
                errors.push(format!("Process inventory task failed: {e}"));
                None
            }
        };

        let sample = self.sampler.sample_network().await;
        if let Some(failure) = sample.failure {
            errors.push(format!("Network probe failed: {failure}"));
        }
        let network = NetworkSnapshot::from_reading(sample.reading, OffsetDateTime::now_utc());

        CycleReadings {
            server_id: LOCAL_SERVER_ID.to_string(),
            server,
            applications,
            network,
            errors,
        }
    }
}

impl Collect for HostCollector {
    fn collect(&self) -> BoxFuture<'_, CycleReadings> {
        Box::pin(self.run())
    }
}

/// Application record for a classified process, hosted on the local server.
pub fn derived_application(process: ClassifiedProcess) -> ApplicationRecord {
    ApplicationRecord {
        id: format!("{DERIVED_APP_PREFIX}{}", process.pid),
        name: process.name,
        host_server_id: Some(LOCAL_SERVER_ID.to_string()),
        status: AppStatus::Running,
        port: None,
        version: None,
        pid: Some(process.pid),
        cpu_percent: Some(process.cpu_percent),
        memory_percent: Some(process.memory_percent),
    }
}
