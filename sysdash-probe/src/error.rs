/// Failures raised by host collaborators.
///
/// None of these are fatal for the kernel: a failed probe degrades latency to 0,
/// a failed CPU sample leaves the previous reading in place, an unavailable
/// inventory skips the derived-application update for one cycle.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("reachability probe failed: {0}")]
    ProbeFailure(String),
    #[error("sampling failed: {0}")]
    Sampling(String),
    #[error("process inventory unavailable: {0}")]
    InventoryUnavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
