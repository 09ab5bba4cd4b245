//! In-process server transport
//!
//! Accepts sessions through direct calls instead of a socket. Applies the
//! same endpoint matrix and session gate a network stack would, so the
//! full client path can be exercised without OpenSSL or a free port.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};
use uagw_core::{EndpointSecurity, GatewayPolicy};
use uagw_gateway::{
    GatewaySession, RunningServer, ServerSettings, ServerTransport, SessionGate, SessionRequest,
    TransportError,
};

use crate::error::LoopbackError;

struct Listener {
    url: String,
    gate: Arc<SessionGate>,
    open: AtomicBool,
}

#[derive(Default)]
pub struct LoopbackTransport {
    offered: RwLock<Option<Vec<EndpointSecurity>>>,
    listener: RwLock<Option<Arc<Listener>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoints fixed at initialize time; empty before that
    pub fn offered_endpoints(&self) -> Vec<EndpointSecurity> {
        self.offered.read().clone().unwrap_or_default()
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .read()
            .as_ref()
            .map(|l| l.open.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Open a client session, as a network client would after the
    /// handshake
    pub fn connect(&self, request: SessionRequest) -> Result<GatewaySession, LoopbackError> {
        let listener = self
            .listener
            .read()
            .clone()
            .filter(|l| l.open.load(Ordering::SeqCst))
            .ok_or(LoopbackError::NotListening)?;
        debug!(url = %listener.url, security = %request.security, "Loopback session request");
        Ok(listener.gate.open_session(request)?)
    }
}

#[async_trait]
impl ServerTransport for LoopbackTransport {
    async fn initialize(
        &self,
        settings: &ServerSettings,
        policy: &GatewayPolicy,
    ) -> Result<(), TransportError> {
        if settings.port == 0 {
            return Err(TransportError::Initialize("port must not be 0".to_string()));
        }
        if !settings.resource_path.starts_with('/') {
            return Err(TransportError::Initialize(format!(
                "resource path '{}' must start with '/'",
                settings.resource_path
            )));
        }

        let offered = policy.offered_endpoints();
        if offered.is_empty() {
            return Err(TransportError::Initialize(
                "no security policy/mode pair to offer".to_string(),
            ));
        }
        let url = settings.endpoint_url();
        for endpoint in &offered {
            info!(url = %url, security = %endpoint, "Offering endpoint");
        }
        *self.offered.write() = Some(offered);
        Ok(())
    }

    async fn start(
        &self,
        settings: ServerSettings,
        gate: Arc<SessionGate>,
    ) -> Result<Box<dyn RunningServer>, TransportError> {
        if self.offered.read().is_none() {
            return Err(TransportError::Start("server not initialized".to_string()));
        }
        let listener = Arc::new(Listener {
            url: settings.endpoint_url(),
            gate,
            open: AtomicBool::new(true),
        });
        *self.listener.write() = Some(listener.clone());
        info!(url = %listener.url, "Loopback server listening");
        Ok(Box::new(LoopbackServer { listener }))
    }
}

pub struct LoopbackServer {
    listener: Arc<Listener>,
}

#[async_trait]
impl RunningServer for LoopbackServer {
    fn endpoint_url(&self) -> &str {
        &self.listener.url
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if !self.listener.open.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Stop("server already stopped".to_string()));
        }
        Ok(())
    }
}
