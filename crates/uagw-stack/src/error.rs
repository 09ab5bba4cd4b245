//! Stack adapter errors

use thiserror::Error;
use uagw_gateway::GatewayError;

/// Errors opening a session through the loopback transport
#[derive(Debug, Error)]
pub enum LoopbackError {
    #[error("Server is not listening")]
    NotListening,

    #[error(transparent)]
    Session(#[from] GatewayError),
}
