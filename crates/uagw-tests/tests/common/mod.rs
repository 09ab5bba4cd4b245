//! Shared fixture: a gateway on the loopback transport

#![allow(dead_code)]

use std::sync::Arc;

use uagw_auth::{CertificateVerifier, CredentialStore, TrustList};
use uagw_core::{ClientIdentity, EndpointSecurity, GatewayPolicy};
use uagw_gateway::{Gateway, GatewayConfig, RunningGateway, SessionRequest};
use uagw_stack::{LoopbackTransport, MockBackendClient};

pub const READER: (&str, &str) = ("opcua-reader", "gu/pHCAi1tQ4ekQkPFiGl4wAeimL4SoFvHaFmTmj1S4=");
pub const OPERATOR: (&str, &str) = ("opcua-operator", "ihMAgDJkDb71eBHWdwSM/UP2tLHqg/SldO4z8LwRgMU=");
pub const ADMIN: (&str, &str) = (
    "opcua-admin",
    "O+d5CkM1Gn9SGPKcuy+AThccTIbsCP2Dp/iW5hRXK8U0AllqPOE2bMoq8bEWmYTa",
);

pub const BACKEND: &str = "opc.tcp://opcua-simulator:4841";

pub struct TestFixture {
    pub backend: MockBackendClient,
    pub transport: Arc<LoopbackTransport>,
    pub gateway: RunningGateway,
}

pub fn credentials() -> CredentialStore {
    CredentialStore::from_entries([READER, OPERATOR, ADMIN]).unwrap()
}

impl TestFixture {
    pub async fn start(backend: MockBackendClient, config: GatewayConfig) -> Self {
        Self::start_with_verifier(backend, config, Arc::new(TrustList::default())).await
    }

    pub async fn start_with_verifier(
        backend: MockBackendClient,
        config: GatewayConfig,
        verifier: Arc<dyn CertificateVerifier>,
    ) -> Self {
        let transport = Arc::new(LoopbackTransport::new());
        let gateway = Gateway::new(
            config,
            Arc::new(credentials()),
            verifier,
            Arc::new(backend.clone()),
            transport.clone(),
        )
        .start()
        .await
        .unwrap();
        Self {
            backend,
            transport,
            gateway,
        }
    }

    /// Gateway with the given policy and a reachable backend
    pub async fn online(policy: GatewayPolicy) -> Self {
        Self::start(MockBackendClient::new(), config(policy)).await
    }

    /// Gateway with the given policy and an unreachable backend
    pub async fn offline(policy: GatewayPolicy) -> Self {
        Self::start(MockBackendClient::offline(), config(policy)).await
    }
}

pub fn config(policy: GatewayPolicy) -> GatewayConfig {
    GatewayConfig {
        backend_endpoint: BACKEND.to_string(),
        policy,
        ..Default::default()
    }
}

pub fn plain(identity: ClientIdentity) -> SessionRequest {
    SessionRequest::new(EndpointSecurity::NONE, identity)
}
