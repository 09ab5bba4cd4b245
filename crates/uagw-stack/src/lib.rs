//! uagw-stack - Protocol stack adapters for the OPC-UA security gateway
//!
//! Implements the backend client and server transport seams of
//! `uagw-gateway`:
//! - `opcua` adapter over the `async-opcua` crate (feature `opcua`)
//! - Loopback transport with a simulated backend, for tests and dry runs
//!
//! # Example
//!
//! ```ignore
//! use uagw_stack::{create_stack, StackKind};
//!
//! let stack = create_stack(StackKind::Loopback, &settings)?;
//! let gateway = Gateway::new(config, credentials, verifier, stack.client, stack.transport);
//! ```

pub mod error;
pub mod loopback;

#[cfg(feature = "opcua")]
pub mod opcua;

pub use error::LoopbackError;
pub use loopback::{LoopbackServer, LoopbackTransport};
pub use uagw_core::mock::{BackendCall, MockBackendClient, MockFailure};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uagw_core::BackendClient;
use uagw_gateway::{ServerSettings, ServerTransport, TransportError};

/// Which protocol stack to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackKind {
    /// Real network stack (`async-opcua` crate)
    Opcua,
    /// In-process transport backed by a simulated backend
    Loopback,
}

impl Default for StackKind {
    /// The network stack when it is compiled in, loopback otherwise
    fn default() -> Self {
        if cfg!(feature = "opcua") {
            StackKind::Opcua
        } else {
            StackKind::Loopback
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackKind::Opcua => write!(f, "opcua"),
            StackKind::Loopback => write!(f, "loopback"),
        }
    }
}

impl FromStr for StackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "opcua" => Ok(StackKind::Opcua),
            "loopback" => Ok(StackKind::Loopback),
            other => Err(format!(
                "unknown stack '{}' (expected 'opcua' or 'loopback')",
                other
            )),
        }
    }
}

/// Backend client and server transport of one stack
pub struct Stack {
    pub client: Arc<dyn BackendClient>,
    pub transport: Arc<dyn ServerTransport>,
}

/// Create the client/transport pair for `kind`
pub fn create_stack(kind: StackKind, settings: &ServerSettings) -> Result<Stack, TransportError> {
    match kind {
        #[cfg(feature = "opcua")]
        StackKind::Opcua => Ok(Stack {
            client: Arc::new(opcua::OpcUaBackendClient::new(settings)?),
            transport: Arc::new(opcua::OpcUaServerTransport::new()),
        }),
        #[cfg(not(feature = "opcua"))]
        StackKind::Opcua => {
            let _ = settings;
            Err(TransportError::Unsupported(
                "the OPC-UA network stack requires the 'opcua' feature".to_string(),
            ))
        }
        StackKind::Loopback => Ok(Stack {
            client: Arc::new(MockBackendClient::new()),
            transport: Arc::new(LoopbackTransport::new()),
        }),
    }
}
