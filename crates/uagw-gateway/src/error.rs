//! Gateway error taxonomy
//!
//! Only [`GatewayError::FatalStartupFailure`] ends the process. Everything
//! else is contained: a dead backend degrades the address space, a failed
//! browse leaves the degraded view in place, a refused client gets a
//! protocol-level rejection.

use thiserror::Error;
use uagw_auth::DenyReason;
use uagw_core::BackendError;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connect or session creation against the backend failed
    #[error("Backend unavailable at {endpoint}: {source}")]
    BackendUnavailable {
        endpoint: String,
        #[source]
        source: BackendError,
    },

    /// A client session attempt was refused
    #[error("Authentication rejected for {identity}: {reason}")]
    AuthenticationRejected {
        /// Username or "anonymous"; never a secret
        identity: String,
        reason: DenyReason,
    },

    /// Browsing the connected backend failed while building the view
    #[error("Address space build failed: {0}")]
    AddressSpaceBuildFailure(#[source] BackendError),

    /// Server initialize/start failed
    #[error("Fatal startup failure: {0}")]
    FatalStartupFailure(String),
}

impl GatewayError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::FatalStartupFailure(_))
    }

    /// OPC-UA status code name reported to the client, when there is one
    pub fn status_code(&self) -> Option<&'static str> {
        match self {
            GatewayError::AuthenticationRejected { reason, .. } => Some(reason.status_code()),
            _ => None,
        }
    }
}

/// Errors reading the address space from a granted session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("Unknown node: {0}")]
    NodeNotFound(String),
}

impl ReadError {
    pub fn status_code(&self) -> &'static str {
        match self {
            ReadError::NodeNotFound(_) => "BadNodeIdUnknown",
        }
    }
}

/// Errors from the client-facing server transport
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("Server initialization failed: {0}")]
    Initialize(String),

    #[error("Server start failed: {0}")]
    Start(String),

    #[error("Server stop failed: {0}")]
    Stop(String),

    #[error("Transport not supported: {0}")]
    Unsupported(String),
}

impl From<TransportError> for GatewayError {
    fn from(e: TransportError) -> Self {
        GatewayError::FatalStartupFailure(e.to_string())
    }
}
