//! Backend connector
//!
//! Brings up the single outbound session to the backend. The link is
//! unauthenticated (security policy `None`, mode `None`): the backend is
//! trusted by network placement, strong authentication lives on the
//! client-facing side only.
//!
//! A failed connect never propagates. The connector always hands back a
//! [`BackendLink`], in state `Failed` if nothing worked, and the gateway
//! starts with the degraded address space.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uagw_core::{
    BackendClient, BackendConnection, BackendError, BackendSession, EndpointUrl,
};

use crate::link::BackendLink;

/// How many times to try the backend at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt
    pub initial_backoff: Duration,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// One attempt, no retry
    pub fn single_attempt() -> Self {
        Self::default()
    }

    pub fn bounded(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Delay to wait before attempt number `attempt` (1-based)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

type LiveSession = (Box<dyn BackendConnection>, Box<dyn BackendSession>);

/// Establishes the outbound link to the backend server
pub struct BackendConnector {
    client: Arc<dyn BackendClient>,
    retry: RetryPolicy,
}

impl BackendConnector {
    pub fn new(client: Arc<dyn BackendClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Connect to `endpoint`.
    ///
    /// Returns a `Connected` link holding an open session, or a `Failed`
    /// link carrying the last error.
    pub async fn connect(&self, endpoint: &str) -> BackendLink {
        let mut link = BackendLink::new(endpoint);
        info!(endpoint = %endpoint, "Connecting to backend");

        let url = match EndpointUrl::parse(endpoint) {
            Ok(url) => url,
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Invalid backend endpoint");
                link.mark_failed(e);
                warn!("Gateway will start without backend connection");
                return link;
            }
        };

        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.retry.delay_before(attempt);
                info!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying backend connection"
                );
                tokio::time::sleep(delay).await;
            }

            link.begin_attempt();
            match self.attempt(&url).await {
                Ok((connection, session)) => {
                    link.mark_connected(connection, session);
                    return link;
                }
                Err(e) => {
                    error!(
                        endpoint = %endpoint,
                        attempt,
                        kind = e.kind(),
                        error = %e,
                        "Failed to connect to backend"
                    );
                    link.mark_failed(e);
                }
            }
        }

        warn!("Gateway will start without backend connection");
        link
    }

    async fn attempt(&self, url: &EndpointUrl) -> Result<LiveSession, BackendError> {
        // diagnostic only; the connect below decides
        match self.client.get_endpoints(url).await {
            Ok(endpoints) => info!(count = endpoints.len(), "Found endpoints on backend"),
            Err(e) => warn!(error = %e, "Endpoint discovery failed, connecting anyway"),
        }

        let connection = self.client.connect(url).await?;
        info!(endpoint = %url, "Connected to backend");

        match connection.create_session().await {
            Ok(session) => {
                info!(endpoint = %url, "Backend session created");
                Ok((connection, session))
            }
            Err(e) => {
                if let Err(disconnect_err) = connection.disconnect().await {
                    debug!(error = %disconnect_err, "Disconnect after failed session creation");
                }
                Err(e)
            }
        }
    }
}
