//! Network reading: one reachability probe plus placeholder traffic figures
//!
//! Only latency is observed. Bandwidth, packet rate, error rate and
//! connection count cannot be measured from here, so they are drawn from
//! fixed ranges (see [`placeholder_traffic`]). Consumers must treat them as
//! illustrative values.

use rand::Rng;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{ProbeError, Result};

/// Ranges for the generated traffic figures.
pub const BANDWIDTH_MBPS: std::ops::Range<u32> = 500..1500;
pub const PACKETS_PER_SECOND: std::ops::Range<u32> = 5_000..15_000;
pub const ERROR_RATE_PERCENT: std::ops::Range<f64> = 0.0..0.1;
pub const CONNECTIONS: std::ops::Range<u32> = 1_000..2_000;

/// One network sample as produced by the sampler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkReading {
    pub latency_ms: f64,
    pub bandwidth_mbps: u32,
    pub packets_per_second: u32,
    pub error_rate_percent: f64,
    pub connection_count: u32,
}

/// Reading plus the probe failure it degraded from, if any.
#[derive(Debug)]
pub struct NetworkSample {
    pub reading: NetworkReading,
    pub failure: Option<ProbeError>,
}

/// Connect once to `target` (`host:port`) and return the TCP handshake time
/// in milliseconds. Name resolution shares the timeout but is not timed.
pub async fn probe_reachability(target: &str, limit: Duration) -> Result<f64> {
    let deadline = Instant::now() + limit;

    let addr = timeout(limit, lookup_host(target))
        .await
        .map_err(|_| ProbeError::ProbeFailure(format!("resolving {target} timed out")))?
        .map_err(|e| ProbeError::ProbeFailure(format!("resolving {target}: {e}")))?
        .next()
        .ok_or_else(|| ProbeError::ProbeFailure(format!("{target} resolved to no address")))?;

    let remaining = deadline.saturating_duration_since(Instant::now());
    let started = Instant::now();
    timeout(remaining, TcpStream::connect(addr))
        .await
        .map_err(|_| ProbeError::ProbeFailure(format!("connecting to {target} timed out")))?
        .map_err(|e| ProbeError::ProbeFailure(format!("connecting to {target}: {e}")))?;

    let rtt = started.elapsed().as_secs_f64() * 1000.0;
    debug!(probe_target = %target, rtt_ms = rtt, "reachability probe ok");
    Ok((rtt * 10.0).round() / 10.0)
}

/// Fill the unobservable fields from bounded random ranges.
pub fn placeholder_traffic<R: Rng>(rng: &mut R, latency_ms: f64) -> NetworkReading {
    NetworkReading {
        latency_ms,
        bandwidth_mbps: rng.random_range(BANDWIDTH_MBPS),
        packets_per_second: rng.random_range(PACKETS_PER_SECOND),
        error_rate_percent: rng.random_range(ERROR_RATE_PERCENT),
        connection_count: rng.random_range(CONNECTIONS),
    }
}
