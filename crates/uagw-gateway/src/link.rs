//! Outbound link to the backend server

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};
use uagw_core::{BackendConnection, BackendError, BackendSession};

use crate::error::GatewayError;

/// Connection state of the backend link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one teardown call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// Nothing to tear down
    Skipped,
    Failed(String),
}

/// What [`BackendLink::close`] did, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTeardown {
    pub session_close: StepOutcome,
    pub disconnect: StepOutcome,
}

/// The gateway's single relationship to the backend server.
///
/// Owns the connection and the session while `Connected`; holds neither in
/// any other state. Handed by reference to the address-space builder and
/// consumed by the shutdown routine.
pub struct BackendLink {
    endpoint: String,
    state: LinkState,
    connection: Option<Box<dyn BackendConnection>>,
    session: Option<Box<dyn BackendSession>>,
    last_error: Option<BackendError>,
    attempts: u32,
}

impl BackendLink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: LinkState::Disconnected,
            connection: None,
            session: None,
            last_error: None,
            attempts: 0,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected && self.session.is_some()
    }

    /// The live session, present only while connected
    pub fn session(&self) -> Option<&dyn BackendSession> {
        self.session.as_deref()
    }

    /// Error of the last failed attempt
    pub fn last_error(&self) -> Option<&BackendError> {
        self.last_error.as_ref()
    }

    /// The last failure as a gateway error, for reporting
    pub fn unavailable_error(&self) -> Option<GatewayError> {
        self.last_error
            .clone()
            .map(|source| GatewayError::BackendUnavailable {
                endpoint: self.endpoint.clone(),
                source,
            })
    }

    /// Number of connect attempts made
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.state = LinkState::Connecting;
        self.attempts += 1;
    }

    pub(crate) fn mark_connected(
        &mut self,
        connection: Box<dyn BackendConnection>,
        session: Box<dyn BackendSession>,
    ) {
        self.connection = Some(connection);
        self.session = Some(session);
        self.last_error = None;
        self.state = LinkState::Connected;
    }

    pub(crate) fn mark_failed(&mut self, error: BackendError) {
        self.connection = None;
        self.session = None;
        self.last_error = Some(error);
        self.state = LinkState::Failed;
    }

    /// Close the session, then disconnect.
    ///
    /// Both calls are attempted in that order whatever the first one
    /// returns. No timeout: a hanging close blocks the caller.
    pub async fn close(&mut self) -> LinkTeardown {
        let session_close = match self.session.take() {
            Some(session) => match session.close().await {
                Ok(()) => {
                    info!(endpoint = %self.endpoint, "Backend session closed");
                    StepOutcome::Done
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "Backend session close failed");
                    StepOutcome::Failed(e.to_string())
                }
            },
            None => StepOutcome::Skipped,
        };

        let disconnect = match self.connection.take() {
            Some(connection) => match connection.disconnect().await {
                Ok(()) => {
                    info!(endpoint = %self.endpoint, "Backend disconnected");
                    StepOutcome::Done
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "Backend disconnect failed");
                    StepOutcome::Failed(e.to_string())
                }
            },
            None => StepOutcome::Skipped,
        };

        if self.state == LinkState::Connected {
            self.state = LinkState::Disconnected;
        }

        LinkTeardown {
            session_close,
            disconnect,
        }
    }
}

impl fmt::Debug for BackendLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendLink")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("has_session", &self.session.is_some())
            .field("last_error", &self.last_error)
            .field("attempts", &self.attempts)
            .finish()
    }
}
