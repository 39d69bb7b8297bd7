//! Host identification and resource summary
//!
//! This module handles:
//! - Hostname and primary IPv4 address (seeds the local server record)
//! - Static/slow-moving host facts for the system-info view

use local_ip_address::local_ip;
use serde::Serialize;
use std::net::IpAddr;
use std::time::Instant;
use sysinfo::System;
use tracing::{info, warn};

/// Address reported when no non-loopback IPv4 interface is found.
pub const FALLBACK_IPV4: &str = "127.0.0.1";

/// Who this host is on the network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostIdentity {
    pub hostname: String,
    pub primary_ipv4: String,
}

impl HostIdentity {
    pub fn discover() -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().to_string();

        let primary_ipv4 = match local_ip() {
            Ok(IpAddr::V4(v4)) if !v4.is_loopback() => v4.to_string(),
            Ok(other) => {
                warn!("primary address {} is not a usable IPv4, using {}", other, FALLBACK_IPV4);
                FALLBACK_IPV4.to_string()
            }
            Err(e) => {
                warn!("could not determine primary IPv4 ({}), using {}", e, FALLBACK_IPV4);
                FALLBACK_IPV4.to_string()
            }
        };

        info!("host identity: {} ({})", hostname, primary_ipv4);
        Self { hostname, primary_ipv4 }
    }
}

/// Host facts served alongside the dashboard state.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
    pub hostname: String,
    pub platform: String,
    pub arch: String,
    pub cpus: usize,
    pub total_memory: u64,
    pub free_memory: u64,
    pub uptime_seconds: u64,
    pub process_uptime_seconds: u64,
}

impl ResourceSummary {
    /// `started` is the instant the serving process came up.
    pub fn collect(started: Instant) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        Self {
            hostname: gethostname::gethostname().to_string_lossy().to_string(),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: sys.cpus().len(),
            total_memory: sys.total_memory(),
            free_memory: sys.available_memory(),
            uptime_seconds: System::uptime(),
            process_uptime_seconds: started.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_has_hostname_and_ipv4() {
        let id = HostIdentity::discover();
        assert!(!id.hostname.is_empty());
        assert!(id.primary_ipv4.parse::<std::net::Ipv4Addr>().is_ok());
    }

    #[test]
    fn summary_reports_this_host() {
        let summary = ResourceSummary::collect(Instant::now());
        assert!(summary.cpus > 0);
        assert!(summary.total_memory > 0);
        assert!(summary.free_memory <= summary.total_memory);
        assert_eq!(summary.platform, std::env::consts::OS);
    }
}
