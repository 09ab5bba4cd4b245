//! Adapter for the `async-opcua` crate (client and server)
//!
//! Client side: one backend session with an anonymous token over an
//! unsecured channel, driven by the stack's session event loop.
//!
//! Server side: the stack terminates secure channels and validates client
//! application certificates against its own certificate store under the
//! PKI root. Every user token it receives is handed to [`GateAuthenticator`],
//! which opens the session through [`SessionGate::open_verified_session`]
//! so the same policy engine decides for the network stack and the loopback
//! stack.

use std::sync::Arc;

use async_opcua::client::{Client, ClientBuilder, IdentityToken, Session};
use async_opcua::crypto::SecurityPolicy as UaSecurityPolicy;
use async_opcua::server::address_space::Variable;
use async_opcua::server::authenticator::{AuthManager, Password, UserToken};
use async_opcua::server::node_manager::memory::{
    simple_node_manager, NamespaceMetadata, SimpleNodeManager,
};
use async_opcua::server::{ServerBuilder, ServerEndpoint, ServerHandle};
use async_opcua::types as ua;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uagw_auth::DenyReason;
use uagw_core::{
    AddressSpaceView, BackendClient, BackendConnection, BackendError, BackendResult,
    BackendSession, BrowseResult, ClientIdentity, EndpointDescription, EndpointSecurity,
    EndpointUrl, GatewayPolicy, Identifier, MessageSecurityMode, NodeId, ReferenceDescription,
    SecurityPolicy, Variant,
};
use uagw_gateway::{
    GatewayError, RunningServer, ServerSettings, ServerTransport, SessionGate, TransportError,
};

/// Policy id advertised for username/password tokens
const USERNAME_POLICY_ID: &str = "username";

fn to_ua_policy(policy: SecurityPolicy) -> UaSecurityPolicy {
    match policy {
        SecurityPolicy::None => UaSecurityPolicy::None,
        SecurityPolicy::Basic256Sha256 => UaSecurityPolicy::Basic256Sha256,
    }
}

fn to_ua_mode(mode: MessageSecurityMode) -> ua::MessageSecurityMode {
    match mode {
        MessageSecurityMode::None => ua::MessageSecurityMode::None,
        MessageSecurityMode::Sign => ua::MessageSecurityMode::Sign,
        MessageSecurityMode::SignAndEncrypt => ua::MessageSecurityMode::SignAndEncrypt,
    }
}

fn from_ua_policy(uri: &str) -> Option<SecurityPolicy> {
    [SecurityPolicy::None, SecurityPolicy::Basic256Sha256]
        .into_iter()
        .find(|p| p.uri() == uri)
}

fn from_ua_mode(mode: ua::MessageSecurityMode) -> Option<MessageSecurityMode> {
    match mode {
        ua::MessageSecurityMode::None => Some(MessageSecurityMode::None),
        ua::MessageSecurityMode::Sign => Some(MessageSecurityMode::Sign),
        ua::MessageSecurityMode::SignAndEncrypt => Some(MessageSecurityMode::SignAndEncrypt),
        _ => None,
    }
}

fn from_ua_node_id(node_id: &ua::NodeId) -> NodeId {
    match &node_id.identifier {
        ua::Identifier::Numeric(id) => NodeId::numeric(node_id.namespace, *id),
        ua::Identifier::String(id) => NodeId::string(node_id.namespace, id.to_string()),
        other => NodeId::string(node_id.namespace, format!("{:?}", other)),
    }
}

fn to_ua_node_id(node_id: &NodeId) -> ua::NodeId {
    match &node_id.identifier {
        Identifier::Numeric(id) => ua::NodeId::new(node_id.namespace, *id),
        Identifier::String(id) => ua::NodeId::new(node_id.namespace, id.clone()),
    }
}

/// Status code a refused session attempt is answered with
fn deny_status(reason: &DenyReason) -> ua::StatusCode {
    match reason {
        DenyReason::SecurityNotOffered(_) => ua::StatusCode::BadSecurityPolicyRejected,
        DenyReason::CertificateMissing => ua::StatusCode::BadCertificateInvalid,
        DenyReason::CertificateRejected | DenyReason::CertificateUntrusted => {
            ua::StatusCode::BadCertificateUntrusted
        }
        DenyReason::AnonymousDisabled => ua::StatusCode::BadIdentityTokenRejected,
        DenyReason::InvalidCredentials => ua::StatusCode::BadUserAccessDenied,
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Backend client over `async_opcua::client`
pub struct OpcUaBackendClient {
    client: tokio::sync::Mutex<Client>,
}

impl OpcUaBackendClient {
    pub fn new(settings: &ServerSettings) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .application_name(format!("{} (backend link)", settings.application_name))
            .application_uri(format!("{}:client", settings.application_uri))
            .product_uri(settings.build_info.product_uri.clone())
            .pki_dir(settings.pki_dir.join("client"))
            .create_sample_keypair(true)
            .trust_server_certs(true)
            .session_retry_limit(0)
            .client()
            .map_err(|errors| TransportError::Initialize(errors.join("; ")))?;
        Ok(Self {
            client: tokio::sync::Mutex::new(client),
        })
    }
}

#[async_trait]
impl BackendClient for OpcUaBackendClient {
    async fn get_endpoints(&self, url: &EndpointUrl) -> BackendResult<Vec<EndpointDescription>> {
        let endpoints = self
            .client
            .lock()
            .await
            .get_server_endpoints_from_url(url.to_string())
            .await
            .map_err(|e| BackendError::Discovery(e.to_string()))?;

        Ok(endpoints
            .iter()
            .filter_map(|e| {
                Some(EndpointDescription {
                    endpoint_url: e.endpoint_url.to_string(),
                    security_policy: from_ua_policy(e.security_policy_uri.as_ref())?,
                    security_mode: from_ua_mode(e.security_mode)?,
                })
            })
            .collect())
    }

    async fn connect(&self, url: &EndpointUrl) -> BackendResult<Box<dyn BackendConnection>> {
        let endpoint: ua::EndpointDescription = (
            url.to_string().as_str(),
            UaSecurityPolicy::None.to_str(),
            ua::MessageSecurityMode::None,
            ua::UserTokenPolicy::anonymous(),
        )
            .into();
        let (session, event_loop) = self
            .client
            .lock()
            .await
            .connect_to_matching_endpoint(endpoint, IdentityToken::Anonymous)
            .await
            .map_err(|e| BackendError::Connect(e.to_string()))?;

        Ok(Box::new(OpcUaConnection {
            session,
            event_loop: Mutex::new(Some(event_loop.spawn())),
        }))
    }
}

struct OpcUaConnection {
    session: Arc<Session>,
    event_loop: Mutex<Option<JoinHandle<ua::StatusCode>>>,
}

#[async_trait]
impl BackendConnection for OpcUaConnection {
    /// The event loop creates and activates the session; this waits for it.
    async fn create_session(&self) -> BackendResult<Box<dyn BackendSession>> {
        if !self.session.wait_for_connection().await {
            return Err(BackendError::CreateSession(
                "session was not activated".to_string(),
            ));
        }
        Ok(Box::new(OpcUaSession {
            session: self.session.clone(),
        }))
    }

    async fn disconnect(&self) -> BackendResult<()> {
        let event_loop = self.event_loop.lock().take();
        match event_loop {
            Some(event_loop) => {
                event_loop.abort();
                match event_loop.await {
                    Ok(status) => debug!(%status, "Backend event loop ended"),
                    Err(e) if e.is_cancelled() => debug!("Backend event loop stopped"),
                    Err(e) => return Err(BackendError::Disconnect(e.to_string())),
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}

struct OpcUaSession {
    session: Arc<Session>,
}

#[async_trait]
impl BackendSession for OpcUaSession {
    async fn browse(&self, node: &NodeId) -> BackendResult<BrowseResult> {
        let description = ua::BrowseDescription {
            node_id: to_ua_node_id(node),
            browse_direction: ua::BrowseDirection::Forward,
            reference_type_id: ua::ReferenceTypeId::Organizes.into(),
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: ua::BrowseDescriptionResultMask::all().bits(),
        };
        let results = self
            .session
            .browse(&[description], 0, None)
            .await
            .map_err(|e| BackendError::Browse(e.to_string()))?;

        let references = results
            .into_iter()
            .flat_map(|r| r.references.unwrap_or_default())
            .map(|r| ReferenceDescription {
                node_id: from_ua_node_id(&r.node_id.node_id),
                browse_name: r.browse_name.name.to_string(),
                display_name: r.display_name.text.to_string(),
            })
            .collect();
        Ok(BrowseResult { references })
    }

    /// Closes the session and its channel; the later disconnect only
    /// stops the event loop.
    async fn close(&self) -> BackendResult<()> {
        self.session
            .disconnect()
            .await
            .map_err(|e| BackendError::Close(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Routes every user token the stack receives through the [`SessionGate`]
pub struct GateAuthenticator {
    gate: Arc<SessionGate>,
}

impl GateAuthenticator {
    pub fn new(gate: Arc<SessionGate>) -> Self {
        Self { gate }
    }

    fn admit(
        &self,
        endpoint: &ServerEndpoint,
        identity: ClientIdentity,
    ) -> Result<uagw_core::Principal, ua::Error> {
        let security = endpoint_security(endpoint).ok_or_else(|| {
            ua::Error::new(
                ua::StatusCode::BadSecurityPolicyRejected,
                "endpoint security not supported",
            )
        })?;
        match self.gate.open_verified_session(security, &identity) {
            Ok(session) => Ok(session.principal().clone()),
            Err(GatewayError::AuthenticationRejected { reason, .. }) => {
                Err(ua::Error::new(deny_status(&reason), reason.to_string()))
            }
            Err(e) => Err(ua::Error::new(ua::StatusCode::BadInternalError, e.to_string())),
        }
    }
}

fn endpoint_security(endpoint: &ServerEndpoint) -> Option<EndpointSecurity> {
    let policy = from_ua_policy(endpoint.security_policy().to_uri())?;
    let mode = from_ua_mode(endpoint.message_security_mode())?;
    Some(EndpointSecurity::new(policy, mode))
}

#[async_trait]
impl AuthManager for GateAuthenticator {
    async fn authenticate_anonymous_token(&self, endpoint: &ServerEndpoint) -> Result<(), ua::Error> {
        self.admit(endpoint, ClientIdentity::anonymous()).map(|_| ())
    }

    async fn authenticate_username_identity_token(
        &self,
        endpoint: &ServerEndpoint,
        username: &str,
        password: &Password,
    ) -> Result<UserToken, ua::Error> {
        let principal = self.admit(endpoint, ClientIdentity::user(username, password.get()))?;
        Ok(UserToken(principal.to_string()))
    }

    fn user_token_policies(&self, _endpoint: &ServerEndpoint) -> Vec<ua::UserTokenPolicy> {
        let mut policies = Vec::new();
        if self.gate.engine().policy().allow_anonymous {
            policies.push(ua::UserTokenPolicy::anonymous());
        }
        policies.push(ua::UserTokenPolicy {
            policy_id: ua::UAString::from(USERNAME_POLICY_ID),
            token_type: ua::UserTokenType::UserName,
            issued_token_type: ua::UAString::null(),
            issuer_endpoint_url: ua::UAString::null(),
            security_policy_uri: ua::UAString::null(),
        });
        policies
    }
}

/// Server transport over `async_opcua::server`
#[derive(Debug, Default)]
pub struct OpcUaServerTransport;

impl OpcUaServerTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn builder(settings: &ServerSettings, policy: &GatewayPolicy) -> ServerBuilder {
        let mut builder = ServerBuilder::new()
            .application_name(settings.application_name.clone())
            .application_uri(settings.application_uri.clone())
            .product_uri(settings.build_info.product_uri.clone())
            .pki_dir(settings.pki_dir.clone())
            .create_sample_keypair(true)
            .host(settings.hostname.clone())
            .port(settings.port)
            .trust_client_certs(policy.auto_accept_unknown_certificates);

        // User tokens are advertised by the authenticator, not per endpoint
        let no_token_ids: &[String] = &[];
        for (i, endpoint) in policy.offered_endpoints().into_iter().enumerate() {
            builder = builder.add_endpoint(
                format!("endpoint_{}", i),
                ServerEndpoint::new(
                    &settings.resource_path,
                    to_ua_policy(endpoint.policy),
                    to_ua_mode(endpoint.mode),
                    no_token_ids,
                ),
            );
        }
        builder
    }

    fn populate(handle: &ServerHandle, view: &AddressSpaceView) -> Result<(), TransportError> {
        let manager = handle
            .node_managers()
            .get_of_type::<SimpleNodeManager>()
            .ok_or_else(|| TransportError::Start("gateway node manager missing".into()))?;
        let ns = handle
            .get_namespace_index(&view.namespace_uri)
            .ok_or_else(|| TransportError::Start("gateway namespace missing".into()))?;

        let mut getters = Vec::new();
        {
            let mut address_space = manager.address_space().write();
            for folder in &view.folders {
                let folder_id = ua::NodeId::new(ns, folder.browse_name.clone());
                address_space.add_folder(
                    &folder_id,
                    folder.browse_name.as_str(),
                    folder.browse_name.as_str(),
                    &ua::NodeId::objects_folder_id(),
                );
                let variables = folder
                    .variables
                    .iter()
                    .map(|variable| {
                        let node_id = ua::NodeId::new(ns, to_ua_node_id(&variable.node_id).identifier);
                        getters.push((node_id.clone(), variable.getter()));
                        Variable::new(
                            &node_id,
                            variable.browse_name.as_str(),
                            variable.browse_name.as_str(),
                            ua::UAString::from(""),
                        )
                    })
                    .collect();
                address_space.add_variables(variables, &folder_id);
            }
        }

        for (node_id, getter) in getters {
            manager.inner().add_read_callback(node_id, move |_, _, _| {
                let Variant::String(value) = getter();
                Ok(ua::DataValue::new_now(ua::UAString::from(value)))
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ServerTransport for OpcUaServerTransport {
    async fn initialize(
        &self,
        settings: &ServerSettings,
        policy: &GatewayPolicy,
    ) -> Result<(), TransportError> {
        // The authenticator needs the gate, which exists only at start;
        // this pass validates the listener config.
        let config = Self::builder(settings, policy).config();
        if !config.is_valid() {
            return Err(TransportError::Initialize(
                "invalid server configuration".into(),
            ));
        }
        for endpoint in policy.offered_endpoints() {
            info!(url = %settings.endpoint_url(), security = %endpoint, "Offering endpoint");
        }
        Ok(())
    }

    async fn start(
        &self,
        settings: ServerSettings,
        gate: Arc<SessionGate>,
    ) -> Result<Box<dyn RunningServer>, TransportError> {
        let view = gate.view().clone();
        let (server, handle) = Self::builder(&settings, gate.engine().policy())
            .with_authenticator(Arc::new(GateAuthenticator::new(gate.clone())))
            .with_node_manager(simple_node_manager(
                NamespaceMetadata {
                    namespace_uri: view.namespace_uri.clone(),
                    ..Default::default()
                },
                "gateway",
            ))
            .build()
            .map_err(TransportError::Start)?;
        Self::populate(&handle, &view)?;
        debug!(
            users = gate.engine().credentials().len(),
            "User tokens checked by the gateway engine"
        );

        let task = tokio::spawn(async move { server.run().await });

        Ok(Box::new(OpcUaRunningServer {
            url: settings.endpoint_url(),
            handle,
            task: Mutex::new(Some(task)),
        }))
    }
}

struct OpcUaRunningServer {
    url: String,
    handle: ServerHandle,
    task: Mutex<Option<JoinHandle<Result<(), String>>>>,
}

#[async_trait]
impl RunningServer for OpcUaRunningServer {
    fn endpoint_url(&self) -> &str {
        &self.url
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.handle.cancel();
        let task = self.task.lock().take();
        match task {
            Some(task) => task
                .await
                .map_err(|e| TransportError::Stop(e.to_string()))?
                .map_err(TransportError::Stop),
            None => {
                warn!("Server already stopped");
                Ok(())
            }
        }
    }
}
