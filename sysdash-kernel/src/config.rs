use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    pub server: ServerConf,
    pub schedule: ScheduleConf,
    pub probe: ProbeConf,
    pub limits: LimitsConf,
    pub alerts: AlertsConf,
    pub inventory: InventoryConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScheduleConf {
    pub fast_interval_secs: u64, // sample + broadcast
    pub slow_interval_secs: u64, // alert evaluation
    pub cpu_sample_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProbeConf {
    pub target: String, // host:port, TCP connect
    pub timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LimitsConf {
    pub log_capacity: usize,     // kept server-side
    pub log_window: usize,       // exposed to clients
    pub subscriber_queue: usize, // per-subscriber pending updates
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AlertsConf {
    pub cpu_critical: f32,
    pub memory_critical: f32,
    pub latency_warning_ms: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct InventoryConf {
    pub max_processes: usize,
    pub include_unclassified: bool,
}

impl Default for ServerConf {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 3000 }
    }
}

impl Default for ScheduleConf {
    fn default() -> Self {
        Self { fast_interval_secs: 5, slow_interval_secs: 10, cpu_sample_ms: 100 }
    }
}

impl Default for ProbeConf {
    fn default() -> Self {
        Self { target: "google.com:443".into(), timeout_ms: 2000 }
    }
}

impl Default for LimitsConf {
    fn default() -> Self {
        Self { log_capacity: 100, log_window: 50, subscriber_queue: 256 }
    }
}

impl Default for AlertsConf {
    fn default() -> Self {
        Self { cpu_critical: 90.0, memory_critical: 95.0, latency_warning_ms: 100.0 }
    }
}

impl Default for InventoryConf {
    fn default() -> Self {
        Self { max_processes: 10, include_unclassified: false }
    }
}

impl ScheduleConf {
    pub fn fast_interval(&self) -> Duration {
        Duration::from_secs(self.fast_interval_secs.max(1))
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_secs(self.slow_interval_secs.max(1))
    }

    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_ms)
    }
}

impl ProbeConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Config from `$SYSDASH_CONFIG` (default `sysdash.yaml`), then `PORT`.
pub async fn load_config() -> DashboardConfig {
    let path = std::env::var("SYSDASH_CONFIG").unwrap_or_else(|_| "sysdash.yaml".into());
    let mut cfg = load_config_from(Path::new(&path)).await;
    apply_port_override(&mut cfg, std::env::var("PORT").ok().as_deref());
    cfg
}

/// Missing or empty file → defaults. Invalid YAML → warning + defaults.
pub async fn load_config_from(path: &Path) -> DashboardConfig {
    if !path.exists() {
        warn!("no {} found, using default config", path.display());
        return DashboardConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return DashboardConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!("invalid config {}: {}", path.display(), e);
        DashboardConfig::default()
    })
}

pub fn apply_port_override(cfg: &mut DashboardConfig, port: Option<&str>) {
    let Some(raw) = port else { return };
    match raw.trim().parse::<u16>() {
        Ok(p) => cfg.server.port = p,
        Err(_) => warn!("ignoring PORT={:?}: not a port number", raw),
    }
}
