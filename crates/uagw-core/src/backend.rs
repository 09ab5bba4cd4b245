//! Backend-facing OPC-UA client abstraction
//!
//! The gateway holds exactly one outbound link to the backend server. The
//! link is built from three layers, mirroring how an OPC-UA client stack is
//! used: a [`BackendClient`] discovers endpoints and opens a
//! [`BackendConnection`] (secure channel), on which a single
//! [`BackendSession`] is created. Adapters for a concrete protocol stack
//! implement these traits; tests use scripted mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;
use crate::models::{EndpointUrl, MessageSecurityMode, NodeId, SecurityPolicy};

/// Endpoint advertised by the backend in a GetEndpoints response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    /// Endpoint URL as reported by the server
    pub endpoint_url: String,
    /// Security policy offered on this endpoint
    pub security_policy: SecurityPolicy,
    /// Message security mode offered on this endpoint
    pub security_mode: MessageSecurityMode,
}

/// One reference returned by a Browse call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDescription {
    /// Target node of the reference
    pub node_id: NodeId,
    /// Browse name of the target node
    pub browse_name: String,
    /// Display name of the target node
    pub display_name: String,
}

/// Result of browsing one node on the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseResult {
    pub references: Vec<ReferenceDescription>,
}

/// Outbound OPC-UA client used to reach the backend server
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Query the endpoints the backend advertises (GetEndpoints)
    async fn get_endpoints(&self, url: &EndpointUrl) -> BackendResult<Vec<EndpointDescription>>;

    /// Open a transport connection with security policy `None` and mode `None`
    async fn connect(&self, url: &EndpointUrl) -> BackendResult<Box<dyn BackendConnection>>;
}

/// An open secure channel to the backend
#[async_trait]
pub trait BackendConnection: Send + Sync {
    /// Create and activate a session on this connection
    async fn create_session(&self) -> BackendResult<Box<dyn BackendSession>>;

    /// Close the secure channel and the underlying socket
    async fn disconnect(&self) -> BackendResult<()>;
}

/// An activated session on the backend
#[async_trait]
pub trait BackendSession: Send + Sync {
    /// Browse the forward hierarchical references of `node`
    async fn browse(&self, node: &NodeId) -> BackendResult<BrowseResult>;

    /// Close the session (CloseSession)
    async fn close(&self) -> BackendResult<()>;
}
