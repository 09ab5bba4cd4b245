//! End-to-end tests for gateway startup, address-space modes and shutdown
//!
//! Run with: cargo test -p uagw-tests --test gateway_e2e_test

mod common;

use std::time::Duration;

use common::{config, plain, TestFixture, BACKEND, OPERATOR};
use pretty_assertions::assert_eq;
use uagw_core::{
    CertificateInfo, ClientIdentity, EndpointSecurity, GatewayPolicy, MessageSecurityMode,
    SecurityPolicy, Variant, ViewMode,
};
use uagw_gateway::{
    BuildFailurePolicy, LinkState, RetryPolicy, SessionRequest, StepOutcome, TeardownAction,
    DEGRADED_MESSAGE,
};
use uagw_stack::{BackendCall, MockBackendClient, MockFailure};

// =============================================================================
// Degraded mode
// =============================================================================

#[tokio::test]
async fn test_unreachable_backend_serves_degraded_status() {
    let fixture = TestFixture::offline(GatewayPolicy::from_flags(true, false)).await;
    assert_eq!(fixture.gateway.link_state(), LinkState::Failed);
    assert!(fixture.transport.is_listening());

    // Certificate, no credentials, on a signed and encrypted channel
    let identity = ClientIdentity::anonymous()
        .with_certificate(CertificateInfo::new("5A1F00C3", "CN=plant-hmi"));
    let request = SessionRequest::new(
        EndpointSecurity::new(
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::SignAndEncrypt,
        ),
        identity,
    );
    let session = fixture.transport.connect(request).unwrap();

    assert_eq!(
        session.read("Gateway/ServerStatus").unwrap(),
        Variant::String(DEGRADED_MESSAGE.to_string())
    );
    assert_eq!(
        session.read("Gateway/ServerStatus").unwrap().as_str(),
        Some("Gateway Running - Backend not connected")
    );
}

#[tokio::test]
async fn test_degraded_view_has_exactly_one_status_node() {
    let fixture = TestFixture::offline(GatewayPolicy::default()).await;
    let view = fixture.gateway.view();

    assert_eq!(view.mode, ViewMode::Degraded);
    assert_eq!(view.folder_count(), 1);
    assert_eq!(view.variable_count(), 1);
    assert!(view.find("OpcPlc/Info").is_none());
}

#[tokio::test]
async fn test_discovery_failure_alone_does_not_degrade() {
    let backend = MockBackendClient::new();
    backend.fail(MockFailure::Discovery);
    let fixture = TestFixture::start(backend, config(GatewayPolicy::default())).await;

    assert_eq!(fixture.gateway.link_state(), LinkState::Connected);
    assert_eq!(fixture.gateway.view().mode, ViewMode::Proxy);
}

#[tokio::test]
async fn test_session_create_failure_degrades_and_disconnects() {
    let backend = MockBackendClient::new();
    backend.fail(MockFailure::CreateSession);
    let fixture = TestFixture::start(backend, config(GatewayPolicy::default())).await;

    assert_eq!(fixture.gateway.link_state(), LinkState::Failed);
    assert_eq!(fixture.gateway.view().mode, ViewMode::Degraded);
    assert_eq!(fixture.backend.count(BackendCall::Disconnect), 1);
}

// =============================================================================
// Proxy mode
// =============================================================================

#[tokio::test]
async fn test_connected_backend_serves_proxy_info() {
    let fixture = TestFixture::online(GatewayPolicy::default()).await;
    assert_eq!(fixture.gateway.view().mode, ViewMode::Proxy);

    let session = fixture
        .transport
        .connect(plain(ClientIdentity::user(OPERATOR.0, OPERATOR.1)))
        .unwrap();
    let info = session.read("OpcPlc/Info").unwrap();
    assert!(info.as_str().unwrap().contains(BACKEND));
    assert!(session.read("Gateway/ServerStatus").is_err());

    let entries = session.browse();
    assert!(entries.iter().any(|e| e.path == "OpcPlc" && e.is_folder));
    assert!(entries.iter().any(|e| e.path == "OpcPlc/Info" && !e.is_folder));
}

#[tokio::test]
async fn test_browse_failure_rolls_back_to_degraded() {
    let backend = MockBackendClient::new();
    backend.fail(MockFailure::Browse);
    let fixture = TestFixture::start(backend, config(GatewayPolicy::default())).await;

    assert_eq!(fixture.gateway.link_state(), LinkState::Connected);
    assert_eq!(fixture.gateway.view().mode, ViewMode::Degraded);
}

#[tokio::test]
async fn test_browse_failure_keep_partial() {
    let backend = MockBackendClient::new();
    backend.fail(MockFailure::Browse);
    let mut cfg = config(GatewayPolicy::default());
    cfg.on_build_failure = BuildFailurePolicy::KeepPartial;
    let fixture = TestFixture::start(backend, cfg).await;

    let view = fixture.gateway.view();
    assert_eq!(view.mode, ViewMode::Partial);
    assert_eq!(view.variable_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_reaches_late_backend() {
    let backend = MockBackendClient::new();
    backend.fail_connect_times(2);
    let mut cfg = config(GatewayPolicy::default());
    cfg.retry = RetryPolicy::bounded(3, Duration::from_millis(200), Duration::from_secs(1));
    let fixture = TestFixture::start(backend, cfg).await;

    assert_eq!(fixture.gateway.link_state(), LinkState::Connected);
    assert_eq!(fixture.backend.count(BackendCall::Connect), 3);
    assert_eq!(fixture.gateway.view().mode, ViewMode::Proxy);
}

#[tokio::test]
async fn test_default_policy_tries_backend_once() {
    let fixture = TestFixture::offline(GatewayPolicy::default()).await;
    assert_eq!(fixture.backend.count(BackendCall::Connect), 1);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_shutdown_closes_session_before_disconnect() {
    let fixture = TestFixture::online(GatewayPolicy::default()).await;
    assert_eq!(fixture.backend.open_sessions(), 1);

    let report = fixture.gateway.shutdown().await;
    assert_eq!(
        report.attempted(),
        vec![
            TeardownAction::StopServer,
            TeardownAction::CloseSession,
            TeardownAction::DisconnectLink
        ]
    );
    assert!(report.is_clean());

    let calls = fixture.backend.calls();
    let close = calls
        .iter()
        .position(|c| *c == BackendCall::CloseSession)
        .unwrap();
    let disconnect = calls
        .iter()
        .position(|c| *c == BackendCall::Disconnect)
        .unwrap();
    assert!(close < disconnect);
    assert_eq!(fixture.backend.open_sessions(), 0);
    assert!(!fixture.transport.is_listening());
}

#[tokio::test]
async fn test_shutdown_with_failed_link_is_noop_for_backend() {
    let fixture = TestFixture::offline(GatewayPolicy::default()).await;
    let report = fixture.gateway.shutdown().await;

    assert_eq!(report.steps[1], (TeardownAction::CloseSession, StepOutcome::Skipped));
    assert_eq!(report.steps[2], (TeardownAction::DisconnectLink, StepOutcome::Skipped));
    assert!(report.is_clean());
    assert_eq!(fixture.backend.count(BackendCall::CloseSession), 0);
}

#[tokio::test]
async fn test_shutdown_disconnects_even_if_close_fails() {
    let backend = MockBackendClient::new();
    backend.fail(MockFailure::CloseSession);
    let fixture = TestFixture::start(backend, config(GatewayPolicy::default())).await;

    let report = fixture.gateway.shutdown().await;
    assert!(!report.is_clean());
    assert_eq!(report.steps[2], (TeardownAction::DisconnectLink, StepOutcome::Done));
    assert_eq!(fixture.backend.count(BackendCall::Disconnect), 1);
}
