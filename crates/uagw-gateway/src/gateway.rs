//! Gateway lifecycle: startup sequence and shutdown

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uagw_auth::{AuthPolicyEngine, CertificateVerifier, CredentialStore};
use uagw_core::{AddressSpaceView, BackendClient, GatewayPolicy};

use crate::builder::{AddressSpaceBuilder, BuildFailurePolicy};
use crate::connector::{BackendConnector, RetryPolicy};
use crate::error::{GatewayError, GatewayResult};
use crate::link::{BackendLink, LinkState, StepOutcome};
use crate::session::SessionGate;
use crate::transport::{RunningServer, ServerSettings, ServerTransport};

/// Everything the gateway needs besides its collaborators
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub backend_endpoint: String,
    pub server: ServerSettings,
    pub policy: GatewayPolicy,
    pub retry: RetryPolicy,
    pub on_build_failure: BuildFailurePolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend_endpoint: "opc.tcp://opcua-simulator:4841".to_string(),
            server: ServerSettings::default(),
            policy: GatewayPolicy::default(),
            retry: RetryPolicy::default(),
            on_build_failure: BuildFailurePolicy::default(),
        }
    }
}

/// A gateway that has not been started yet
pub struct Gateway {
    config: GatewayConfig,
    credentials: Arc<CredentialStore>,
    verifier: Arc<dyn CertificateVerifier>,
    client: Arc<dyn BackendClient>,
    transport: Arc<dyn ServerTransport>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        credentials: Arc<CredentialStore>,
        verifier: Arc<dyn CertificateVerifier>,
        client: Arc<dyn BackendClient>,
        transport: Arc<dyn ServerTransport>,
    ) -> Self {
        Self {
            config,
            credentials,
            verifier,
            client,
            transport,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the startup sequence.
    ///
    /// Order: connect backend, initialize server, build address space,
    /// start server. Only server initialize/start failures are fatal; the
    /// backend link is closed before the error is returned.
    pub async fn start(self) -> GatewayResult<RunningGateway> {
        let GatewayConfig {
            backend_endpoint,
            server: settings,
            policy,
            retry,
            on_build_failure,
        } = self.config;

        if policy.require_certificate {
            warn!("require_certificate is set but not enforced; certificate-less clients are still admitted");
        }

        let mut link = BackendConnector::new(self.client.clone())
            .with_retry(retry)
            .connect(&backend_endpoint)
            .await;
        if let Some(err) = link.unavailable_error() {
            warn!(error = %err, "Continuing without backend");
        }

        if let Err(e) = self.transport.initialize(&settings, &policy).await {
            error!(error = %e, "Server initialization failed");
            link.close().await;
            return Err(e.into());
        }
        info!(endpoint = %settings.endpoint_url(), "Gateway server initialized");

        let view = AddressSpaceBuilder::new()
            .with_failure_policy(on_build_failure)
            .build(&link)
            .await;
        info!(
            mode = %view.mode,
            folders = view.folder_count(),
            variables = view.variable_count(),
            "Address space ready"
        );

        let policy = Arc::new(policy);
        let engine = Arc::new(AuthPolicyEngine::new(
            self.credentials,
            policy.clone(),
            self.verifier,
        ));
        let gate = Arc::new(SessionGate::new(engine, Arc::new(view)));

        let server = match self.transport.start(settings, gate.clone()).await {
            Ok(server) => server,
            Err(e) => {
                error!(error = %e, "Server start failed");
                link.close().await;
                return Err(e.into());
            }
        };

        info!(
            endpoint = %server.endpoint_url(),
            backend = %link.state(),
            mode = policy.mode_label(),
            anonymous = policy.allow_anonymous,
            "Gateway is ready"
        );

        Ok(RunningGateway { link, server, gate })
    }
}

/// Teardown step, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownAction {
    StopServer,
    CloseSession,
    DisconnectLink,
}

/// What shutdown did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub steps: Vec<(TeardownAction, StepOutcome)>,
}

impl ShutdownReport {
    /// Actions that were actually invoked, in order
    pub fn attempted(&self) -> Vec<TeardownAction> {
        self.steps
            .iter()
            .filter(|(_, outcome)| *outcome != StepOutcome::Skipped)
            .map(|(action, _)| *action)
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, outcome)| !matches!(outcome, StepOutcome::Failed(_)))
    }
}

/// A started gateway
pub struct RunningGateway {
    link: BackendLink,
    server: Box<dyn RunningServer>,
    gate: Arc<SessionGate>,
}

impl RunningGateway {
    /// Entry point for client sessions
    pub fn gate(&self) -> &Arc<SessionGate> {
        &self.gate
    }

    pub fn view(&self) -> &Arc<AddressSpaceView> {
        self.gate.view()
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn endpoint_url(&self) -> &str {
        self.server.endpoint_url()
    }

    /// Stop the server, close the backend session, disconnect the link.
    ///
    /// Every step runs even when an earlier one fails; failures are logged
    /// and reported, never returned.
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!("Shutting down gateway");

        let stop = match self.server.stop().await {
            Ok(()) => {
                info!("Gateway server stopped");
                StepOutcome::Done
            }
            Err(e) => {
                warn!(error = %e, "Server stop failed");
                StepOutcome::Failed(e.to_string())
            }
        };
        let teardown = self.link.close().await;

        ShutdownReport {
            steps: vec![
                (TeardownAction::StopServer, stop),
                (TeardownAction::CloseSession, teardown.session_close),
                (TeardownAction::DisconnectLink, teardown.disconnect),
            ],
        }
    }
}
