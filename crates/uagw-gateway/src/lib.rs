//! uagw-gateway - Security gateway in front of an unsecured OPC-UA server
//!
//! Clients connect to the gateway; the gateway authenticates them and
//! serves an address space built from its single link to the backend.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        OPC-UA Gateway                            │
//! │                                                                  │
//! │   clients ──► ServerTransport ──► SessionGate                    │
//! │                                     │  check_channel / evaluate │
//! │                                     ▼                            │
//! │                              AuthPolicyEngine                    │
//! │                                     │ Allow                      │
//! │                                     ▼                            │
//! │                              AddressSpaceView                    │
//! │                           (Degraded | Proxy | Partial)           │
//! │                                     ▲                            │
//! │                          AddressSpaceBuilder                     │
//! │                                     │ browse                     │
//! │   BackendConnector ──► BackendLink ─┘                            │
//! │          │                                                       │
//! └──────────┼───────────────────────────────────────────────────────┘
//!            ▼
//!      backend server (no security)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use uagw_gateway::{Gateway, GatewayConfig};
//!
//! let gateway = Gateway::new(config, credentials, verifier, client, transport);
//! let running = gateway.start().await?;
//! // ... wait for a signal
//! let report = running.shutdown().await;
//! ```

pub mod builder;
pub mod connector;
pub mod error;
pub mod gateway;
pub mod link;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use builder::{
    AddressSpaceBuilder, BuildFailurePolicy, DEGRADED_FOLDER, DEGRADED_MESSAGE,
    DEGRADED_VARIABLE, GATEWAY_NAMESPACE_INDEX, GATEWAY_NAMESPACE_URI, PROXY_FOLDER,
    PROXY_VARIABLE,
};
pub use connector::{BackendConnector, RetryPolicy};
pub use error::{GatewayError, GatewayResult, ReadError, TransportError};
pub use gateway::{Gateway, GatewayConfig, RunningGateway, ShutdownReport, TeardownAction};
pub use link::{BackendLink, LinkState, LinkTeardown, StepOutcome};
pub use session::{GatewaySession, SessionGate, SessionRequest};
pub use transport::{BuildInfo, RunningServer, ServerSettings, ServerTransport};
