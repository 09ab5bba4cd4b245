//! Per-session access gate
//!
//! Every client session passes through [`SessionGate::open_session`] before
//! it can see a single node. Only a [`GatewaySession`] can browse or read
//! the view, and one is only handed out on `Allow`. A refused attempt
//! leaves nothing behind.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uagw_auth::{AuthDecision, AuthPolicyEngine, DenyReason};
use uagw_core::{
    AddressSpaceView, BrowseEntry, ClientIdentity, EndpointSecurity, IdentityKind, NodeId,
    Principal, Variant,
};

use crate::error::{GatewayError, ReadError};

/// A client's request to open a session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// {policy, mode} negotiated on the secure channel
    pub security: EndpointSecurity,
    pub identity: ClientIdentity,
}

impl SessionRequest {
    pub fn new(security: EndpointSecurity, identity: ClientIdentity) -> Self {
        Self { security, identity }
    }

    /// Loggable label for the identity; never includes a secret
    pub fn identity_label(&self) -> String {
        match self.identity.kind() {
            IdentityKind::UserName => self.identity.username.clone().unwrap_or_default(),
            IdentityKind::Anonymous => "anonymous".to_string(),
        }
    }
}

/// Authorizes session attempts and hands out read access to the view
pub struct SessionGate {
    engine: Arc<AuthPolicyEngine>,
    view: Arc<AddressSpaceView>,
    next_session_id: AtomicU32,
}

impl SessionGate {
    pub fn new(engine: Arc<AuthPolicyEngine>, view: Arc<AddressSpaceView>) -> Self {
        Self {
            engine,
            view,
            next_session_id: AtomicU32::new(1),
        }
    }

    pub fn engine(&self) -> &Arc<AuthPolicyEngine> {
        &self.engine
    }

    pub fn view(&self) -> &Arc<AddressSpaceView> {
        &self.view
    }

    /// Run the channel check (security pair, certificate trust), then the
    /// user token check.
    pub fn open_session(&self, request: SessionRequest) -> Result<GatewaySession, GatewayError> {
        let label = request.identity_label();
        self.engine
            .check_channel(&request.security, request.identity.certificate.as_ref())
            .map_err(|reason| Self::rejected(&label, &request.security, reason))?;
        self.activate(&label, request.security, &request.identity)
    }

    /// Session on a channel whose certificate the protocol stack already
    /// validated against its own store.
    ///
    /// The security pair is still checked against the offered set and the
    /// user token still goes through the engine.
    pub fn open_verified_session(
        &self,
        security: EndpointSecurity,
        identity: &ClientIdentity,
    ) -> Result<GatewaySession, GatewayError> {
        let label = SessionRequest::new(security, identity.clone()).identity_label();
        self.engine
            .check_security(&security)
            .map_err(|reason| Self::rejected(&label, &security, reason))?;
        self.activate(&label, security, identity)
    }

    fn activate(
        &self,
        label: &str,
        security: EndpointSecurity,
        identity: &ClientIdentity,
    ) -> Result<GatewaySession, GatewayError> {
        let principal = match self.engine.evaluate(identity) {
            AuthDecision::Allow(principal) => principal,
            AuthDecision::Deny(reason) => return Err(Self::rejected(label, &security, reason)),
        };

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        info!(
            session_id = id,
            principal = %principal,
            security = %security,
            "Session activated"
        );

        Ok(GatewaySession {
            id,
            principal,
            security,
            view: self.view.clone(),
        })
    }

    fn rejected(label: &str, security: &EndpointSecurity, reason: DenyReason) -> GatewayError {
        warn!(identity = %label, security = %security, %reason, "Session rejected");
        GatewayError::AuthenticationRejected {
            identity: label.to_string(),
            reason,
        }
    }
}

/// An authorized client session
#[derive(Debug, Clone)]
pub struct GatewaySession {
    id: u32,
    principal: Principal,
    security: EndpointSecurity,
    view: Arc<AddressSpaceView>,
}

impl GatewaySession {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn security(&self) -> EndpointSecurity {
        self.security
    }

    pub fn browse(&self) -> Vec<BrowseEntry> {
        self.view.browse()
    }

    /// Read a variable by browse path, e.g. `Gateway/ServerStatus`
    pub fn read(&self, path: &str) -> Result<Variant, ReadError> {
        let variable = self
            .view
            .find(path)
            .ok_or_else(|| ReadError::NodeNotFound(path.to_string()))?;
        debug!(session_id = self.id, node = %variable.node_id, "Read");
        Ok(variable.read())
    }

    /// Read a variable by node id
    pub fn read_node(&self, node_id: &NodeId) -> Result<Variant, ReadError> {
        let variable = self
            .view
            .find_by_id(node_id)
            .ok_or_else(|| ReadError::NodeNotFound(node_id.to_string()))?;
        debug!(session_id = self.id, node = %variable.node_id, "Read");
        Ok(variable.read())
    }
}
