//! Process-wide gateway policy snapshot

use serde::{Deserialize, Serialize};

use super::{EndpointSecurity, MessageSecurityMode, SecurityPolicy};

/// Access-control posture of the client-facing server.
///
/// Built once at startup and shared read-only between the server transport
/// and the authentication engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPolicy {
    /// Accept sessions that present neither credentials nor a certificate
    pub allow_anonymous: bool,
    /// Trust client certificates not yet present in the trust store
    pub auto_accept_unknown_certificates: bool,
    /// Configured but not enforced; what "required" means is undecided
    pub require_certificate: bool,
    /// Enabled security policies, in the order they are offered
    pub security_policies: Vec<SecurityPolicy>,
    /// Enabled message security modes, in the order they are offered
    pub security_modes: Vec<MessageSecurityMode>,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self::from_flags(false, false)
    }
}

impl GatewayPolicy {
    /// Policy with the stock endpoint matrix.
    ///
    /// Unknown-certificate auto-trust follows `allow_anonymous`: dev mode
    /// trusts everything, production mode requires explicit trust. Use
    /// [`GatewayPolicy::with_auto_accept`] to decouple the two.
    pub fn from_flags(allow_anonymous: bool, require_certificate: bool) -> Self {
        Self {
            allow_anonymous,
            auto_accept_unknown_certificates: allow_anonymous,
            require_certificate,
            security_policies: vec![SecurityPolicy::None, SecurityPolicy::Basic256Sha256],
            security_modes: vec![
                MessageSecurityMode::None,
                MessageSecurityMode::Sign,
                MessageSecurityMode::SignAndEncrypt,
            ],
        }
    }

    pub fn with_auto_accept(mut self, auto_accept: bool) -> Self {
        self.auto_accept_unknown_certificates = auto_accept;
        self
    }

    /// The {policy, mode} pairs offered to clients: every coherent
    /// combination of the enabled lists, policies outermost.
    pub fn offered_endpoints(&self) -> Vec<EndpointSecurity> {
        self.security_policies
            .iter()
            .flat_map(|policy| {
                self.security_modes
                    .iter()
                    .map(move |mode| EndpointSecurity::new(*policy, *mode))
            })
            .filter(EndpointSecurity::is_coherent)
            .collect()
    }

    /// Whether a client channel negotiated one of the offered pairs
    pub fn permits(&self, endpoint: &EndpointSecurity) -> bool {
        endpoint.is_coherent()
            && self.security_policies.contains(&endpoint.policy)
            && self.security_modes.contains(&endpoint.mode)
    }

    /// Operator-facing label for the anonymous setting
    pub fn mode_label(&self) -> &'static str {
        if self.allow_anonymous {
            "dev"
        } else {
            "production"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_production() {
        let policy = GatewayPolicy::default();
        assert!(!policy.allow_anonymous);
        assert!(!policy.auto_accept_unknown_certificates);
        assert!(!policy.require_certificate);
        assert_eq!(policy.mode_label(), "production");
    }

    #[test]
    fn test_anonymous_flag_drives_certificate_trust() {
        let policy = GatewayPolicy::from_flags(true, false);
        assert!(policy.auto_accept_unknown_certificates);

        let policy = GatewayPolicy::from_flags(true, false).with_auto_accept(false);
        assert!(policy.allow_anonymous);
        assert!(!policy.auto_accept_unknown_certificates);
    }

    #[test]
    fn test_offered_endpoints() {
        let offered = GatewayPolicy::default().offered_endpoints();
        assert_eq!(
            offered,
            vec![
                EndpointSecurity::NONE,
                EndpointSecurity::new(SecurityPolicy::Basic256Sha256, MessageSecurityMode::Sign),
                EndpointSecurity::new(
                    SecurityPolicy::Basic256Sha256,
                    MessageSecurityMode::SignAndEncrypt
                ),
            ]
        );
    }

    #[test]
    fn test_permits_only_enabled_pairs() {
        let mut policy = GatewayPolicy::default();
        policy.security_modes = vec![MessageSecurityMode::SignAndEncrypt];

        assert!(!policy.permits(&EndpointSecurity::NONE));
        assert!(!policy.permits(&EndpointSecurity::new(
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::Sign
        )));
        assert!(policy.permits(&EndpointSecurity::new(
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::SignAndEncrypt
        )));
        // incoherent pair is never permitted
        assert!(!policy.permits(&EndpointSecurity::new(
            SecurityPolicy::None,
            MessageSecurityMode::SignAndEncrypt
        )));
    }
}
