//! Per-session authentication decisions
//!
//! The engine is stateless: every call evaluates the presented identity
//! against the read-only [`CredentialStore`], [`GatewayPolicy`] and trust
//! store. There is no lockout or throttling and no session affinity.

use std::fmt;
use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uagw_core::{
    CertificateInfo, ClientIdentity, EndpointSecurity, GatewayPolicy, IdentityKind, Principal,
    Secret,
};

use crate::credentials::CredentialStore;
use crate::pki::{CertificateVerdict, CertificateVerifier};

/// Why a session attempt was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Channel negotiated a {policy, mode} pair that is not offered
    SecurityNotOffered(EndpointSecurity),
    /// Signed channel without a client certificate
    CertificateMissing,
    /// Certificate sits in the rejected store
    CertificateRejected,
    /// Certificate unknown and auto-accept is off
    CertificateUntrusted,
    /// Anonymous access is disabled
    AnonymousDisabled,
    /// Unknown user or wrong secret (deliberately indistinguishable)
    InvalidCredentials,
}

impl DenyReason {
    /// OPC-UA status code name a stack would answer with
    pub fn status_code(&self) -> &'static str {
        match self {
            DenyReason::SecurityNotOffered(_) => "BadSecurityPolicyRejected",
            DenyReason::CertificateMissing => "BadCertificateInvalid",
            DenyReason::CertificateRejected | DenyReason::CertificateUntrusted => {
                "BadCertificateUntrusted"
            }
            DenyReason::AnonymousDisabled => "BadIdentityTokenRejected",
            DenyReason::InvalidCredentials => "BadUserAccessDenied",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::SecurityNotOffered(sec) => write!(f, "security {} not offered", sec),
            DenyReason::CertificateMissing => write!(f, "client certificate missing"),
            DenyReason::CertificateRejected => write!(f, "client certificate rejected"),
            DenyReason::CertificateUntrusted => write!(f, "client certificate not trusted"),
            DenyReason::AnonymousDisabled => write!(f, "anonymous access disabled"),
            DenyReason::InvalidCredentials => write!(f, "invalid username or password"),
        }
    }
}

/// Outcome of [`AuthPolicyEngine::evaluate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow(Principal),
    Deny(DenyReason),
}

impl AuthDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, AuthDecision::Allow(_))
    }
}

/// Authentication policy engine facing the gateway's clients
pub struct AuthPolicyEngine {
    credentials: Arc<CredentialStore>,
    policy: Arc<GatewayPolicy>,
    verifier: Arc<dyn CertificateVerifier>,
}

impl AuthPolicyEngine {
    pub fn new(
        credentials: Arc<CredentialStore>,
        policy: Arc<GatewayPolicy>,
        verifier: Arc<dyn CertificateVerifier>,
    ) -> Self {
        Self {
            credentials,
            policy,
            verifier,
        }
    }

    pub fn policy(&self) -> &GatewayPolicy {
        &self.policy
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Transport-stage check run before any identity is looked at.
    ///
    /// The negotiated pair must be offered, a signed channel must carry a
    /// client certificate, and a presented certificate must be trusted (or
    /// auto-accepted). The certificate only ever establishes channel trust;
    /// it is never a session identity.
    pub fn check_channel(
        &self,
        endpoint: &EndpointSecurity,
        certificate: Option<&CertificateInfo>,
    ) -> Result<(), DenyReason> {
        self.check_security(endpoint)?;
        match certificate {
            Some(certificate) => self.check_certificate(certificate),
            None if endpoint.is_secure() => {
                warn!(security = %endpoint, "Rejected channel: no client certificate");
                Err(DenyReason::CertificateMissing)
            }
            None => Ok(()),
        }
    }

    /// The negotiated {policy, mode} pair must be one the gateway offers
    pub fn check_security(&self, endpoint: &EndpointSecurity) -> Result<(), DenyReason> {
        if self.policy.permits(endpoint) {
            Ok(())
        } else {
            warn!(security = %endpoint, "Rejected channel: security pair not offered");
            Err(DenyReason::SecurityNotOffered(*endpoint))
        }
    }

    /// Decide whether the user token in `identity` may open a session.
    ///
    /// Only the username and password are looked at. An identity without a
    /// username is anonymous, whatever certificate its channel carried.
    pub fn evaluate(&self, identity: &ClientIdentity) -> AuthDecision {
        match identity.kind() {
            IdentityKind::UserName => {
                let username = identity.username.as_deref().unwrap_or_default();
                let empty = Secret::default();
                let password = identity.password.as_ref().unwrap_or(&empty);
                if self.is_valid_user(username, password) {
                    AuthDecision::Allow(Principal::User(username.to_string()))
                } else {
                    AuthDecision::Deny(DenyReason::InvalidCredentials)
                }
            }
            IdentityKind::Anonymous => {
                if self.policy.allow_anonymous {
                    debug!("Anonymous session accepted");
                    AuthDecision::Allow(Principal::Anonymous)
                } else {
                    warn!("Anonymous session rejected");
                    AuthDecision::Deny(DenyReason::AnonymousDisabled)
                }
            }
        }
    }

    /// Username/password check.
    ///
    /// True iff `username` exists and its stored secret equals `password`.
    /// The comparison runs in constant time over the secret bytes.
    pub fn is_valid_user(&self, username: &str, password: &Secret) -> bool {
        info!(user = %username, "Authentication attempt");

        let valid = self
            .credentials
            .get(username)
            .map(|stored| bool::from(stored.expose().ct_eq(password.expose())))
            .unwrap_or(false);

        if valid {
            info!(user = %username, "User authenticated");
        } else {
            warn!(user = %username, "Authentication failed");
        }
        valid
    }

    fn check_certificate(&self, certificate: &CertificateInfo) -> Result<(), DenyReason> {
        match self.verifier.verdict(certificate) {
            CertificateVerdict::Trusted => Ok(()),
            CertificateVerdict::Rejected => {
                warn!(
                    thumbprint = %certificate.thumbprint,
                    subject = %certificate.subject,
                    "Client certificate is in the rejected store"
                );
                Err(DenyReason::CertificateRejected)
            }
            CertificateVerdict::Unknown if self.policy.auto_accept_unknown_certificates => {
                info!(
                    thumbprint = %certificate.thumbprint,
                    subject = %certificate.subject,
                    "Auto-accepting unknown client certificate"
                );
                Ok(())
            }
            CertificateVerdict::Unknown => {
                warn!(
                    thumbprint = %certificate.thumbprint,
                    subject = %certificate.subject,
                    "Unknown client certificate refused"
                );
                if let Err(e) = self.verifier.record_rejected(certificate) {
                    warn!(error = %e, "Failed to record refused certificate");
                }
                Err(DenyReason::CertificateUntrusted)
            }
        }
    }
}
