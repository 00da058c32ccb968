use std::io::Error as IoError;
use std::net::{AddrParseError, SocketAddr};

use thiserror::Error;

/// Failures setting up the liveness endpoint.
#[derive(Debug, Error)]
pub enum AppError {
    /// Usually another process already holds the port.
    #[error("failed to bind liveness endpoint on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: IoError,
    },
    #[error("invalid liveness bind address: {0}")]
    AddrParse(#[from] AddrParseError),
}
