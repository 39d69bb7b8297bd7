use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

/// Id of the record seeded for the host the kernel runs on.
pub const LOCAL_SERVER_ID: &str = "local-server";
/// Applications whose id starts with this were derived from the process table.
pub const DERIVED_APP_PREFIX: &str = "proc-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Online,
    Warning,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub status: ServerStatus,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub uptime_seconds: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
}

/// Partial update for a server. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerMetricsUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub status: Option<ServerStatus>,
    pub cpu_percent: Option<f32>,
    pub memory_percent: Option<f32>,
    pub uptime_seconds: Option<u64>,
    pub last_updated: Option<OffsetDateTime>,
}

impl ServerRecord {
    pub fn apply(&mut self, update: &ServerMetricsUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(address) = &update.address {
            self.address = address.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(cpu) = update.cpu_percent {
            self.cpu_percent = cpu.clamp(0.0, 100.0);
        }
        if let Some(mem) = update.memory_percent {
            self.memory_percent = mem.clamp(0.0, 100.0);
        }
        if let Some(uptime) = update.uptime_seconds {
            self.uptime_seconds = uptime;
        }
        if let Some(ts) = update.last_updated {
            self.last_updated = Some(ts);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    #[default]
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: String,
    pub name: String,
    pub host_server_id: Option<String>,
    pub status: AppStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f32>,
}

impl ApplicationRecord {
    pub fn is_derived(&self) -> bool {
        self.id.starts_with(DERIVED_APP_PREFIX)
    }
}

/// Latest network reading. Overwritten wholesale each cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub latency_ms: f64,
    pub bandwidth_mbps: u32,
    pub packets_per_second: u32,
    pub error_rate_percent: f64,
    pub connection_count: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
}

impl NetworkSnapshot {
    pub fn from_reading(reading: sysdash_probe::NetworkReading, at: OffsetDateTime) -> Self {
        Self {
            latency_ms: reading.latency_ms,
            bandwidth_mbps: reading.bandwidth_mbps,
            packets_per_second: reading.packets_per_second,
            error_rate_percent: reading.error_rate_percent,
            connection_count: reading.connection_count,
            last_updated: Some(at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AlertEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: format!("alert-{}", uuid::Uuid::new_v4().simple()),
            severity,
            message: message.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: format!("log-{}", uuid::Uuid::new_v4().simple()),
            timestamp: OffsetDateTime::now_utc(),
            level,
            message: message.into(),
        }
    }
}

/// Point-in-time copy of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub servers: Vec<ServerRecord>,
    pub applications: Vec<ApplicationRecord>,
    pub network: NetworkSnapshot,
    pub alerts: Vec<AlertEvent>,
    pub logs: Vec<LogEntry>,
}

/// Which collection an update carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Servers,
    Applications,
    Network,
    Alerts,
    Logs,
    All,
}

/// Change notification, on the wire as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Update {
    Servers(Vec<ServerRecord>),
    Applications(Vec<ApplicationRecord>),
    Network(NetworkSnapshot),
    Alerts(Vec<AlertEvent>),
    Logs(Vec<LogEntry>),
    All(Snapshot),
}

impl Update {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Update::Servers(_) => UpdateKind::Servers,
            Update::Applications(_) => UpdateKind::Applications,
            Update::Network(_) => UpdateKind::Network,
            Update::Alerts(_) => UpdateKind::Alerts,
            Update::Logs(_) => UpdateKind::Logs,
            Update::All(_) => UpdateKind::All,
        }
    }
}

/// Body of `POST /api/servers`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewServer {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub status: ServerStatus,
    #[serde(default)]
    pub cpu_percent: f32,
    #[serde(default)]
    pub memory_percent: f32,
    #[serde(default)]
    pub uptime_seconds: u64,
}

/// Body of `POST /api/applications`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewApplication {
    pub name: String,
    #[serde(default)]
    pub host_server_id: Option<String>,
    #[serde(default)]
    pub status: AppStatus,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub version: Option<String>,
}

static ID_SEQ: AtomicU64 = AtomicU64::new(0);

/// `<prefix>-<unix millis>-<seq>`; the sequence keeps ids minted in the same
/// millisecond distinct.
pub fn timestamp_id(prefix: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let seq = ID_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{millis}-{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ServerRecord {
        ServerRecord {
            id: "srv-1".into(),
            name: "alpha".into(),
            address: "10.0.0.2".into(),
            status: ServerStatus::Online,
            cpu_percent: 10.0,
            memory_percent: 20.0,
            uptime_seconds: 60,
            last_updated: None,
        }
    }

    #[test]
    fn partial_update_touches_only_present_fields() {
        let mut s = server();
        let before = s.clone();
        s.apply(&ServerMetricsUpdate { cpu_percent: Some(55.0), ..Default::default() });
        assert_eq!(s.cpu_percent, 55.0);
        assert_eq!(s.name, before.name);
        assert_eq!(s.address, before.address);
        assert_eq!(s.status, before.status);
        assert_eq!(s.memory_percent, before.memory_percent);
        assert_eq!(s.uptime_seconds, before.uptime_seconds);
        assert_eq!(s.last_updated, before.last_updated);
    }

    #[test]
    fn empty_update_is_identity() {
        let mut s = server();
        s.apply(&ServerMetricsUpdate::default());
        assert_eq!(s, server());
    }

    #[test]
    fn update_wire_shape() {
        let json = serde_json::to_value(Update::Logs(vec![LogEntry::new(LogLevel::Warn, "x")])).unwrap();
        assert_eq!(json["type"], "logs");
        assert_eq!(json["data"][0]["level"], "WARN");
        assert_eq!(json["data"][0]["message"], "x");

        let json = serde_json::to_value(Update::All(Snapshot::default())).unwrap();
        assert_eq!(json["type"], "all");
        assert!(json["data"]["servers"].is_array());
    }

    #[test]
    fn derived_marker() {
        let mut app = ApplicationRecord {
            id: "proc-42".into(),
            name: "Node.js Application".into(),
            host_server_id: Some(LOCAL_SERVER_ID.into()),
            status: AppStatus::Running,
            port: None,
            version: None,
            pid: Some(42),
            cpu_percent: None,
            memory_percent: None,
        };
        assert!(app.is_derived());
        app.id = timestamp_id("app");
        assert!(!app.is_derived());
    }

    #[test]
    fn timestamp_ids_are_unique() {
        let a = timestamp_id("srv");
        let b = timestamp_id("srv");
        assert_ne!(a, b);
        assert!(a.starts_with("srv-"));
    }
}
