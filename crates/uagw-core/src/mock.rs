//! Simulated backend server (feature `mock`)
//!
//! Answers discovery, connect, session and browse calls from memory. Each
//! call can be scripted to fail, and every call is journaled so tests can
//! assert on ordering. Used by the loopback stack and by unit tests of the
//! crates above this one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use crate::{
    BackendClient, BackendConnection, BackendError, BackendResult, BackendSession, BrowseResult,
    EndpointDescription, EndpointUrl, MessageSecurityMode, NodeId, ReferenceDescription,
    SecurityPolicy,
};

/// Calls received by the mock backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    GetEndpoints,
    Connect,
    CreateSession,
    Browse,
    CloseSession,
    Disconnect,
}

/// Call that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFailure {
    Discovery,
    Connect,
    CreateSession,
    Browse,
    CloseSession,
    Disconnect,
}

#[derive(Default)]
struct MockState {
    failures: RwLock<HashSet<MockFailure>>,
    /// Remaining connect calls that fail before the backend comes up
    connect_failures_left: AtomicU32,
    references: RwLock<Vec<ReferenceDescription>>,
    journal: Mutex<Vec<BackendCall>>,
    open_sessions: AtomicU32,
}

impl MockState {
    fn record(&self, call: BackendCall) {
        self.journal.lock().push(call);
    }

    fn fails(&self, failure: MockFailure) -> bool {
        self.failures.read().contains(&failure)
    }
}

/// In-memory backend with the node layout of the simulator
#[derive(Clone)]
pub struct MockBackendClient {
    state: Arc<MockState>,
}

impl Default for MockBackendClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackendClient {
    pub fn new() -> Self {
        let state = MockState::default();
        *state.references.write() = Self::default_references();
        Self {
            state: Arc::new(state),
        }
    }

    /// A backend that refuses every connection
    pub fn offline() -> Self {
        let mock = Self::new();
        mock.fail(MockFailure::Connect);
        mock
    }

    pub fn fail(&self, failure: MockFailure) {
        self.state.failures.write().insert(failure);
    }

    /// Fail the next `n` connect calls, then accept
    pub fn fail_connect_times(&self, n: u32) {
        self.state.connect_failures_left.store(n, Ordering::SeqCst);
    }

    /// Clear every scripted failure
    pub fn heal(&self) {
        self.state.failures.write().clear();
        self.state.connect_failures_left.store(0, Ordering::SeqCst);
    }

    pub fn set_references(&self, references: Vec<ReferenceDescription>) {
        *self.state.references.write() = references;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.journal.lock().clone()
    }

    /// Forget the journal, e.g. after startup, to assert on teardown only
    pub fn clear_calls(&self) {
        self.state.journal.lock().clear();
    }

    pub fn count(&self, call: BackendCall) -> usize {
        self.state
            .journal
            .lock()
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    /// Sessions created and not yet closed
    pub fn open_sessions(&self) -> u32 {
        self.state.open_sessions.load(Ordering::SeqCst)
    }

    fn default_references() -> Vec<ReferenceDescription> {
        vec![
            ReferenceDescription {
                node_id: NodeId::numeric(0, 2253),
                browse_name: "Server".to_string(),
                display_name: "Server".to_string(),
            },
            ReferenceDescription {
                node_id: NodeId::string(3, "OpcPlc"),
                browse_name: "OpcPlc".to_string(),
                display_name: "OpcPlc".to_string(),
            },
        ]
    }
}

#[async_trait]
impl BackendClient for MockBackendClient {
    async fn get_endpoints(&self, url: &EndpointUrl) -> BackendResult<Vec<EndpointDescription>> {
        self.state.record(BackendCall::GetEndpoints);
        if self.state.fails(MockFailure::Discovery) {
            return Err(BackendError::Discovery(format!(
                "no response from {}",
                url
            )));
        }
        Ok(vec![EndpointDescription {
            endpoint_url: url.to_string(),
            security_policy: SecurityPolicy::None,
            security_mode: MessageSecurityMode::None,
        }])
    }

    async fn connect(&self, url: &EndpointUrl) -> BackendResult<Box<dyn BackendConnection>> {
        self.state.record(BackendCall::Connect);
        let scripted = self
            .state
            .connect_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted || self.state.fails(MockFailure::Connect) {
            return Err(BackendError::Connect(format!(
                "connection refused by {}:{}",
                url.host(),
                url.port()
            )));
        }
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl BackendConnection for MockConnection {
    async fn create_session(&self) -> BackendResult<Box<dyn BackendSession>> {
        self.state.record(BackendCall::CreateSession);
        if self.state.fails(MockFailure::CreateSession) {
            return Err(BackendError::CreateSession("BadTooManySessions".to_string()));
        }
        self.state.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: self.state.clone(),
        }))
    }

    async fn disconnect(&self) -> BackendResult<()> {
        self.state.record(BackendCall::Disconnect);
        if self.state.fails(MockFailure::Disconnect) {
            return Err(BackendError::Disconnect("BadConnectionClosed".to_string()));
        }
        Ok(())
    }
}

struct MockSession {
    state: Arc<MockState>,
}

#[async_trait]
impl BackendSession for MockSession {
    async fn browse(&self, node: &NodeId) -> BackendResult<BrowseResult> {
        self.state.record(BackendCall::Browse);
        if self.state.fails(MockFailure::Browse) {
            return Err(BackendError::Browse(format!("BadNodeIdUnknown: {}", node)));
        }
        if *node != NodeId::objects_folder() {
            return Ok(BrowseResult::default());
        }
        Ok(BrowseResult {
            references: self.state.references.read().clone(),
        })
    }

    async fn close(&self) -> BackendResult<()> {
        self.state.record(BackendCall::CloseSession);
        if self.state.fails(MockFailure::CloseSession) {
            return Err(BackendError::Close("BadSessionIdInvalid".to_string()));
        }
        self.state.open_sessions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
