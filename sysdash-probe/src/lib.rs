//! Host-facing collaborators for the sysdash kernel
//!
//! Everything here talks to the operating system or the network:
//! - CPU and memory sampling (tick deltas, memory ratio)
//! - Network reading (reachability probe + placeholder traffic figures)
//! - Process inventory (listing, filtering, classification)
//! - Host identity and resource summary
//!
//! The pure computations behind each reading are exported so callers can
//! test them without a live host.

pub mod discovery;
pub mod error;
pub mod inventory;
pub mod metrics;

pub use discovery::{HostIdentity, ResourceSummary};
pub use error::{ProbeError, Result};
pub use inventory::{ClassifiedProcess, ProcessInventory, ProcessSource, RawProcess};
pub use metrics::{CpuTicks, MetricSampler, NetworkReading, NetworkSample, TickSource};
