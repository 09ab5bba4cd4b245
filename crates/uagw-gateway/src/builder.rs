//! Address-space builder
//!
//! Runs once, after the backend link is resolved and before the server
//! accepts sessions. Two shapes come out of it:
//!
//! - degraded: `Gateway/ServerStatus`, a static "not connected" message
//! - proxy: `OpcPlc/Info`, naming the proxied backend endpoint
//!
//! The backend browse result is only counted and logged; its references are
//! not mirrored node by node.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uagw_core::{
    static_string, AddressSpaceView, BackendSession, FolderNode, NodeId, VariableNode, ViewMode,
};

use crate::error::GatewayError;
use crate::link::BackendLink;

/// Namespace URI of the gateway's own nodes
pub const GATEWAY_NAMESPACE_URI: &str = "urn:uagw:gateway";

/// Namespace index the gateway namespace is registered at
pub const GATEWAY_NAMESPACE_INDEX: u16 = 1;

pub const DEGRADED_FOLDER: &str = "Gateway";
pub const DEGRADED_VARIABLE: &str = "ServerStatus";
pub const DEGRADED_MESSAGE: &str = "Gateway Running - Backend not connected";

pub const PROXY_FOLDER: &str = "OpcPlc";
pub const PROXY_VARIABLE: &str = "Info";

/// What to expose when browsing a connected backend fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildFailurePolicy {
    /// Fall back to the degraded view as a whole
    #[default]
    Degrade,
    /// Keep what was built before the failure (nothing: the proxy folder is
    /// only added once the browse returned)
    KeepPartial,
}

/// Builds the [`AddressSpaceView`] from the state of the backend link
#[derive(Debug, Clone)]
pub struct AddressSpaceBuilder {
    namespace_uri: String,
    namespace_index: u16,
    on_failure: BuildFailurePolicy,
}

impl Default for AddressSpaceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpaceBuilder {
    pub fn new() -> Self {
        Self {
            namespace_uri: GATEWAY_NAMESPACE_URI.to_string(),
            namespace_index: GATEWAY_NAMESPACE_INDEX,
            on_failure: BuildFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, on_failure: BuildFailurePolicy) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn with_namespace(mut self, uri: impl Into<String>, index: u16) -> Self {
        self.namespace_uri = uri.into();
        self.namespace_index = index;
        self
    }

    /// Build the view for `link`
    pub async fn build(&self, link: &BackendLink) -> AddressSpaceView {
        info!("Building address space");

        let session = match link.session() {
            Some(session) if link.is_connected() => session,
            _ => {
                warn!(
                    link_state = %link.state(),
                    "Backend not connected, creating minimal address space"
                );
                return self.degraded_view();
            }
        };

        match self.proxy_view(session, link.endpoint()).await {
            Ok(view) => {
                info!(mode = %view.mode, "Address space created");
                view
            }
            Err(e) => {
                error!(error = %e, "Error building address space");
                match self.on_failure {
                    BuildFailurePolicy::Degrade => {
                        warn!("Falling back to degraded address space");
                        self.degraded_view()
                    }
                    BuildFailurePolicy::KeepPartial => {
                        warn!("Keeping partially built address space");
                        AddressSpaceView::new(&self.namespace_uri, ViewMode::Partial)
                    }
                }
            }
        }
    }

    /// Placeholder tree used when there is no backend session
    pub fn degraded_view(&self) -> AddressSpaceView {
        let folder = FolderNode::new(self.node_id(DEGRADED_FOLDER), DEGRADED_FOLDER).with_variable(
            VariableNode::string(
                self.node_id(&format!("{}.{}", DEGRADED_FOLDER, DEGRADED_VARIABLE)),
                DEGRADED_VARIABLE,
                static_string(DEGRADED_MESSAGE),
            ),
        );
        AddressSpaceView::new(&self.namespace_uri, ViewMode::Degraded).with_folder(folder)
    }

    async fn proxy_view(
        &self,
        session: &dyn BackendSession,
        endpoint: &str,
    ) -> Result<AddressSpaceView, GatewayError> {
        let result = session
            .browse(&NodeId::objects_folder())
            .await
            .map_err(GatewayError::AddressSpaceBuildFailure)?;
        info!(references = result.references.len(), "Found nodes in backend");

        let folder = FolderNode::new(self.node_id(PROXY_FOLDER), PROXY_FOLDER).with_variable(
            VariableNode::string(
                self.node_id(&format!("{}.{}", PROXY_FOLDER, PROXY_VARIABLE)),
                PROXY_VARIABLE,
                static_string(format!("Proxying {}", endpoint)),
            ),
        );
        Ok(AddressSpaceView::new(&self.namespace_uri, ViewMode::Proxy).with_folder(folder))
    }

    fn node_id(&self, name: &str) -> NodeId {
        NodeId::string(self.namespace_index, name)
    }
}
