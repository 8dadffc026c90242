//! Error types for coordinator and unit I/O

use thiserror::Error;

use crate::cycle::Phase;
use crate::registry::ConnId;

/// Failure of a single send or receive on a unit link
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("No acknowledgment within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A cycle that was abandoned part-way through
///
/// Carries the phase and the unit whose link failed. Nothing is retried.
#[derive(Debug, Error)]
#[error("Cycle aborted in {phase} on unit {unit} ({conn_id}): {source}")]
pub struct CycleError {
    pub phase: Phase,
    pub unit: String,
    pub conn_id: ConnId,
    #[source]
    pub source: LinkError,
}

/// Errors that end a signal unit client
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("Could not connect to coordinator at {addr}")]
    ConnectionRefused {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out connecting to coordinator at {addr} after {timeout_ms}ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}
