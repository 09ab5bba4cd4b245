//! Scripted transport stub for unit tests
//!
//! The backend side uses `uagw_core::mock::MockBackendClient`.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uagw_core::GatewayPolicy;

use crate::error::TransportError;
use crate::session::SessionGate;
use crate::transport::{RunningServer, ServerSettings, ServerTransport};

/// Scripted client-facing transport
#[derive(Default)]
pub struct StubTransport {
    pub fail_initialize: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub(crate) events: Arc<Mutex<Vec<&'static str>>>,
    pub(crate) gate: Mutex<Option<Arc<SessionGate>>>,
}

impl StubTransport {
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().clone()
    }

    pub fn gate(&self) -> Option<Arc<SessionGate>> {
        self.gate.lock().clone()
    }
}

#[async_trait]
impl ServerTransport for StubTransport {
    async fn initialize(
        &self,
        _settings: &ServerSettings,
        _policy: &GatewayPolicy,
    ) -> Result<(), TransportError> {
        self.events.lock().push("initialize");
        if self.fail_initialize {
            return Err(TransportError::Initialize("address in use".into()));
        }
        Ok(())
    }

    async fn start(
        &self,
        settings: ServerSettings,
        gate: Arc<SessionGate>,
    ) -> Result<Box<dyn RunningServer>, TransportError> {
        self.events.lock().push("start");
        if self.fail_start {
            return Err(TransportError::Start("listener closed".into()));
        }
        *self.gate.lock() = Some(gate);
        Ok(Box::new(StubServer {
            url: settings.endpoint_url(),
            fail_stop: self.fail_stop,
            events: self.events.clone(),
        }))
    }
}

struct StubServer {
    url: String,
    fail_stop: bool,
    events: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl RunningServer for StubServer {
    fn endpoint_url(&self) -> &str {
        &self.url
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.events.lock().push("stop");
        if self.fail_stop {
            return Err(TransportError::Stop("already stopped".into()));
        }
        Ok(())
    }
}
