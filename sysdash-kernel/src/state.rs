/**
 * STATE STORE - The single shared view of the system
 *
 * ROLE:
 * Owns servers, applications, network stats, alerts and logs. Nothing else
 * touches the collections: callers go through the operations below, each of
 * which runs under one lock and publishes at most one update.
 *
 * ORDERING:
 * Publishing happens while the store lock is held, so the order in which
 * subscribers see updates is the order in which the store changed, and
 * subscribe() can hand out a snapshot with no gap before the next update.
 * Lock order is always store -> hub.
 */

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::config::LimitsConf;
use crate::hub::{BroadcastHub, Subscription};
use crate::models::{
    timestamp_id, AlertEvent, ApplicationRecord, LogEntry, LogLevel, NetworkSnapshot, NewApplication,
    NewServer, ServerMetricsUpdate, ServerRecord, ServerStatus, Snapshot, Update, LOCAL_SERVER_ID,
};

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[derive(Default)]
struct StoreData {
    servers: Vec<ServerRecord>,
    applications: Vec<ApplicationRecord>,
    network: NetworkSnapshot,
    alerts: Vec<AlertEvent>,
    logs: VecDeque<LogEntry>,
}

impl StoreData {
    fn recent_logs(&self, window: usize) -> Vec<LogEntry> {
        let skip = self.logs.len().saturating_sub(window);
        self.logs.iter().skip(skip).cloned().collect()
    }

    fn push_log(&mut self, entry: LogEntry, capacity: usize) {
        self.logs.push_back(entry);
        while self.logs.len() > capacity {
            self.logs.pop_front();
        }
    }

    fn snapshot(&self, log_window: usize) -> Snapshot {
        Snapshot {
            servers: self.servers.clone(),
            applications: self.applications.clone(),
            network: self.network.clone(),
            alerts: self.alerts.clone(),
            logs: self.recent_logs(log_window),
        }
    }
}

/// Everything one fast cycle observed, merged in a single step.
#[derive(Debug, Clone, Default)]
pub struct CycleReadings {
    pub server_id: String,
    pub server: ServerMetricsUpdate,
    /// `None` when the inventory was unavailable: derived apps stay as they were.
    pub applications: Option<Vec<ApplicationRecord>>,
    pub network: NetworkSnapshot,
    /// Failures met while collecting; each becomes an ERROR log entry.
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct StateStore {
    data: Shared<StoreData>,
    hub: BroadcastHub,
    log_capacity: usize,
    log_window: usize,
}

impl StateStore {
    pub fn new(hub: BroadcastHub, limits: &LimitsConf) -> Self {
        Self {
            data: new_state(StoreData::default()),
            hub,
            log_capacity: limits.log_capacity.max(1),
            log_window: limits.log_window.max(1),
        }
    }

    /// Store holding the local host record and the startup log line.
    pub fn seeded(hub: BroadcastHub, limits: &LimitsConf, identity: &sysdash_probe::HostIdentity) -> Self {
        let store = Self::new(hub, limits);
        {
            let mut data = store.data.lock();
            data.servers.push(ServerRecord {
                id: LOCAL_SERVER_ID.to_string(),
                name: identity.hostname.clone(),
                address: identity.primary_ipv4.clone(),
                status: ServerStatus::Online,
                cpu_percent: 0.0,
                memory_percent: 0.0,
                uptime_seconds: sysdash_probe::metrics::host_uptime_secs(),
                last_updated: Some(OffsetDateTime::now_utc()),
            });
        }
        store.log(LogLevel::Info, "Dashboard server started");
        store
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Register a subscriber; its first message is the current client view.
    pub fn subscribe(&self) -> Subscription {
        let data = self.data.lock();
        self.hub.subscribe(Update::All(data.snapshot(self.log_window)))
    }

    // ---- reads -------------------------------------------------------------

    /// Full copy, every retained log included.
    pub fn snapshot(&self) -> Snapshot {
        let data = self.data.lock();
        data.snapshot(self.log_capacity)
    }

    /// Copy as served to clients: logs trimmed to the client window.
    pub fn client_snapshot(&self) -> Snapshot {
        self.data.lock().snapshot(self.log_window)
    }

    pub fn servers(&self) -> Vec<ServerRecord> {
        self.data.lock().servers.clone()
    }

    pub fn applications(&self) -> Vec<ApplicationRecord> {
        self.data.lock().applications.clone()
    }

    pub fn network(&self) -> NetworkSnapshot {
        self.data.lock().network.clone()
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.data.lock().alerts.clone()
    }

    pub fn recent_logs(&self) -> Vec<LogEntry> {
        self.data.lock().recent_logs(self.log_window)
    }

    // ---- mutations ---------------------------------------------------------

    /// Apply the present fields of `update` to server `id`. Unknown id: no-op,
    /// nothing published.
    pub fn merge_server_metrics(&self, id: &str, update: &ServerMetricsUpdate) -> bool {
        let mut data = self.data.lock();
        let Some(server) = data.servers.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        server.apply(update);
        self.hub.publish(Update::Servers(data.servers.clone()));
        true
    }

    /// Drop every derived application, then insert `new_set`. Manually
    /// registered applications are left alone.
    pub fn replace_derived_applications(&self, new_set: Vec<ApplicationRecord>) {
        let mut data = self.data.lock();
        replace_derived(&mut data.applications, new_set);
        self.hub.publish(Update::Applications(data.applications.clone()));
    }

    pub fn set_network(&self, network: NetworkSnapshot) {
        let mut data = self.data.lock();
        data.network = network;
        self.hub.publish(Update::Network(data.network.clone()));
    }

    /// Unbounded: alerts accumulate until an operator clears them.
    pub fn append_alert(&self, alert: AlertEvent) {
        let mut data = self.data.lock();
        data.alerts.push(alert);
        self.hub.publish(Update::Alerts(data.alerts.clone()));
    }

    /// Append, evicting the oldest entries beyond capacity.
    pub fn append_log(&self, entry: LogEntry) {
        let mut data = self.data.lock();
        data.push_log(entry, self.log_capacity);
        self.hub.publish(Update::Logs(data.recent_logs(self.log_window)));
    }

    /// Append a log entry and mirror it to the process log.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        match level {
            LogLevel::Info => info!("{}", entry.message),
            LogLevel::Warn => warn!("{}", entry.message),
            LogLevel::Error => error!("{}", entry.message),
        }
        self.append_log(entry);
    }

    pub fn clear_alerts(&self) {
        let mut data = self.data.lock();
        data.alerts = Vec::new();
        self.hub.publish(Update::Alerts(Vec::new()));
    }

    pub fn clear_logs(&self) {
        let mut data = self.data.lock();
        data.logs = VecDeque::new();
        self.hub.publish(Update::Logs(Vec::new()));
    }

    /// Returns whether an alert with that id existed.
    pub fn remove_alert(&self, id: &str) -> bool {
        let mut data = self.data.lock();
        let before = data.alerts.len();
        data.alerts.retain(|a| a.id != id);
        if data.alerts.len() == before {
            return false;
        }
        self.hub.publish(Update::Alerts(data.alerts.clone()));
        true
    }

    pub fn register_server(&self, new: NewServer) -> ServerRecord {
        let record = ServerRecord {
            id: timestamp_id("srv"),
            name: new.name,
            address: new.address,
            status: new.status,
            cpu_percent: new.cpu_percent.clamp(0.0, 100.0),
            memory_percent: new.memory_percent.clamp(0.0, 100.0),
            uptime_seconds: new.uptime_seconds,
            last_updated: Some(OffsetDateTime::now_utc()),
        };
        let mut data = self.data.lock();
        data.servers.push(record.clone());
        self.hub.publish(Update::Servers(data.servers.clone()));
        record
    }

    pub fn register_application(&self, new: NewApplication) -> ApplicationRecord {
        let record = ApplicationRecord {
            id: timestamp_id("app"),
            name: new.name,
            host_server_id: new.host_server_id,
            status: new.status,
            port: new.port,
            version: new.version,
            pid: None,
            cpu_percent: None,
            memory_percent: None,
        };
        let mut data = self.data.lock();
        if let Some(host) = &record.host_server_id {
            if !data.servers.iter().any(|s| &s.id == host) {
                warn!("application {} references unknown server {}", record.id, host);
            }
        }
        data.applications.push(record.clone());
        self.hub.publish(Update::Applications(data.applications.clone()));
        record
    }

    /// Merge one fast cycle: server metrics, derived applications (when the
    /// inventory ran), network, error logs. Publishes a single `all` update.
    pub fn apply_cycle(&self, readings: CycleReadings) {
        let mut data = self.data.lock();

        if let Some(server) = data.servers.iter_mut().find(|s| s.id == readings.server_id) {
            server.apply(&readings.server);
        }
        if let Some(apps) = readings.applications {
            replace_derived(&mut data.applications, apps);
        }
        data.network = readings.network;
        for message in readings.errors {
            error!("{}", message);
            data.push_log(LogEntry::new(LogLevel::Error, message), self.log_capacity);
        }

        self.hub.publish(Update::All(data.snapshot(self.log_window)));
    }
}

fn replace_derived(applications: &mut Vec<ApplicationRecord>, new_set: Vec<ApplicationRecord>) {
    applications.retain(|a| !a.is_derived());
    applications.extend(new_set);
}
