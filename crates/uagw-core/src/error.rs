//! Error types for the backend-facing OPC-UA client

use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised while talking to the backend OPC-UA server
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Endpoint URL is not a usable `opc.tcp://` URL
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// GetEndpoints service call failed
    #[error("Endpoint discovery failed: {0}")]
    Discovery(String),

    /// Transport connection (secure channel) could not be opened
    #[error("Connection failed: {0}")]
    Connect(String),

    /// CreateSession / ActivateSession failed
    #[error("Session creation failed: {0}")]
    CreateSession(String),

    /// Browse service call failed
    #[error("Browse failed: {0}")]
    Browse(String),

    /// CloseSession failed
    #[error("Session close failed: {0}")]
    Close(String),

    /// Disconnect failed
    #[error("Disconnect failed: {0}")]
    Disconnect(String),

    /// Operation is not available in this build
    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl BackendError {
    /// Short, stable label for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::InvalidEndpoint { .. } => "invalid_endpoint",
            BackendError::Discovery(_) => "discovery",
            BackendError::Connect(_) => "connect",
            BackendError::CreateSession(_) => "create_session",
            BackendError::Browse(_) => "browse",
            BackendError::Close(_) => "close",
            BackendError::Disconnect(_) => "disconnect",
            BackendError::NotSupported(_) => "not_supported",
        }
    }
}
