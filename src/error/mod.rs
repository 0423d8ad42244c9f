use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by gated operations.
#[derive(Debug, Error)]
pub enum GateError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The configured connect timeout elapsed before the transport
    /// reported connected
    #[error("Timed out waiting for the transport to connect")]
    ConnectionTimeout,

    /// The transport rejected an operation
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A structured publish body could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport was torn down while a caller was waiting on readiness
    #[error("Transport stopped while waiting for readiness")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, GateError>;
