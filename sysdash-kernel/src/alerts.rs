//! Threshold rules evaluated on the slow cycle.
//!
//! Evaluation only reads the snapshot; appending the resulting alerts (and
//! the matching log lines) is the scheduler's job. Nothing is debounced: a
//! condition that persists fires again on every evaluation.

use crate::config::AlertsConf;
use crate::models::{AlertEvent, Severity, Snapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRules {
    pub cpu_critical: f32,
    pub memory_critical: f32,
    pub latency_warning_ms: f64,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self::from(&AlertsConf::default())
    }
}

impl From<&AlertsConf> for AlertRules {
    fn from(conf: &AlertsConf) -> Self {
        Self {
            cpu_critical: conf.cpu_critical,
            memory_critical: conf.memory_critical,
            latency_warning_ms: conf.latency_warning_ms,
        }
    }
}

impl AlertRules {
    pub fn evaluate(&self, snapshot: &Snapshot) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();

        for server in &snapshot.servers {
            if server.cpu_percent > self.cpu_critical {
                alerts.push(AlertEvent::new(
                    Severity::Critical,
                    format!("High CPU usage on {}: {}%", server.name, server.cpu_percent),
                ));
            }
            if server.memory_percent > self.memory_critical {
                alerts.push(AlertEvent::new(
                    Severity::Critical,
                    format!("High memory usage on {}: {}%", server.name, server.memory_percent),
                ));
            }
        }

        if snapshot.network.latency_ms > self.latency_warning_ms {
            alerts.push(AlertEvent::new(
                Severity::Warning,
                format!("High network latency: {}ms", snapshot.network.latency_ms),
            ));
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NetworkSnapshot, ServerRecord, ServerStatus};

    fn server(name: &str, cpu: f32, mem: f32) -> ServerRecord {
        ServerRecord {
            id: format!("srv-{name}"),
            name: name.into(),
            address: "10.0.0.1".into(),
            status: ServerStatus::Online,
            cpu_percent: cpu,
            memory_percent: mem,
            uptime_seconds: 0,
            last_updated: None,
        }
    }

    #[test]
    fn cpu_95_gives_one_critical() {
        let snap = Snapshot { servers: vec![server("web-01", 95.0, 40.0)], ..Default::default() };
        let alerts = AlertRules::default().evaluate(&snap);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(alerts[0].message.contains("web-01"));
        assert!(alerts[0].message.contains("95"));
    }

    #[test]
    fn thresholds_are_strict() {
        let snap = Snapshot {
            servers: vec![server("edge", 90.0, 95.0)],
            network: NetworkSnapshot { latency_ms: 100.0, ..Default::default() },
            ..Default::default()
        };
        assert!(AlertRules::default().evaluate(&snap).is_empty());
    }

    #[test]
    fn each_server_and_network_evaluated_independently() {
        let snap = Snapshot {
            servers: vec![server("a", 99.0, 99.0), server("b", 10.0, 96.5)],
            network: NetworkSnapshot { latency_ms: 180.5, ..Default::default() },
            ..Default::default()
        };
        let alerts = AlertRules::default().evaluate(&snap);
        let messages: Vec<_> = alerts.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "High CPU usage on a: 99%",
                "High memory usage on a: 99%",
                "High memory usage on b: 96.5%",
                "High network latency: 180.5ms",
            ]
        );
        assert_eq!(alerts[3].severity, Severity::Warning);
    }

    #[test]
    fn persisting_condition_fires_every_time() {
        let snap = Snapshot { servers: vec![server("hot", 97.0, 1.0)], ..Default::default() };
        let rules = AlertRules::default();
        let first = rules.evaluate(&snap);
        let second = rules.evaluate(&snap);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].id, second[0].id);
    }

    #[test]
    fn rules_follow_config() {
        let rules = AlertRules::from(&AlertsConf { cpu_critical: 50.0, memory_critical: 60.0, latency_warning_ms: 5.0 });
        let snap = Snapshot {
            servers: vec![server("x", 51.0, 10.0)],
            network: NetworkSnapshot { latency_ms: 6.0, ..Default::default() },
            ..Default::default()
        };
        assert_eq!(rules.evaluate(&snap).len(), 2);
    }
}
