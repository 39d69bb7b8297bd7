use std::net::SocketAddr;

/// Errors surfaced by the kernel outside the collection cycles.
///
/// Sampling and inventory failures never reach this type: they are turned
/// into ERROR log entries and the cycle carries on with partial data.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid listen address {0}")]
    Address(String),
    #[error("not found: {0}")]
    NotFound(String),
}
