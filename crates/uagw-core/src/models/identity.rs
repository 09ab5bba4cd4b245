//! Client identity models
//!
//! A [`ClientIdentity`] is built by the server transport for every session
//! attempt and dropped once the decision is made. Nothing here is stored.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A secret string (password or stored credential) that never prints
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw bytes, for comparison only
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Client application certificate as reported by the transport layer.
///
/// Parsing and chain validation belong to the PKI subsystem; the gateway
/// only needs a stable identifier to look the certificate up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Lowercase hex SHA-1 thumbprint of the DER encoding
    pub thumbprint: String,
    /// Subject distinguished name, for logging
    pub subject: String,
    /// DER bytes, when the transport has them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub der: Option<Vec<u8>>,
}

impl CertificateInfo {
    pub fn new(thumbprint: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            thumbprint: thumbprint.into().to_ascii_lowercase(),
            subject: subject.into(),
            der: None,
        }
    }
}

/// What a client presents when it tries to open a session
#[derive(Debug, Clone, Default)]
pub struct ClientIdentity {
    pub username: Option<String>,
    pub password: Option<Secret>,
    /// Application certificate of the secure channel. It decides channel
    /// trust only and never stands in for a user token.
    pub certificate: Option<CertificateInfo>,
}

/// Which authentication path an identity takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    /// No username
    Anonymous,
    /// Username (with or without password)
    UserName,
}

impl ClientIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(username: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            certificate: None,
        }
    }

    pub fn with_certificate(mut self, certificate: CertificateInfo) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// A presented username takes the credential path; anything else is
    /// anonymous, with or without a channel certificate.
    pub fn kind(&self) -> IdentityKind {
        if self.username.is_some() {
            IdentityKind::UserName
        } else {
            IdentityKind::Anonymous
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.kind() == IdentityKind::Anonymous
    }
}

/// Who a granted session belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Principal {
    Anonymous,
    User(String),
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Anonymous => write!(f, "anonymous"),
            Principal::User(name) => write!(f, "user:{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("ihMAgDJkDb71eBHWdwSM");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert_eq!(format!("{}", secret), "***");

        let identity = ClientIdentity::user("opcua-operator", "hunter2");
        assert!(!format!("{:?}", identity).contains("hunter2"));
    }

    #[test]
    fn test_identity_kind() {
        assert_eq!(ClientIdentity::anonymous().kind(), IdentityKind::Anonymous);
        assert_eq!(
            ClientIdentity::user("opcua-reader", "x").kind(),
            IdentityKind::UserName
        );

        let cert = CertificateInfo::new("AB12", "CN=hmi");
        assert_eq!(
            ClientIdentity::anonymous().with_certificate(cert.clone()).kind(),
            IdentityKind::Anonymous
        );
        assert_eq!(
            ClientIdentity::user("opcua-reader", "x")
                .with_certificate(cert)
                .kind(),
            IdentityKind::UserName
        );
    }

    #[test]
    fn test_thumbprint_normalized() {
        let cert = CertificateInfo::new("ABCDEF", "CN=x");
        assert_eq!(cert.thumbprint, "abcdef");
    }

    #[test]
    fn test_certificate_json_omits_missing_der() {
        let json = serde_json::to_value(CertificateInfo::new("AB01", "CN=hmi")).unwrap();
        assert_eq!(json["thumbprint"], "ab01");
        assert!(json.get("der").is_none());
    }
}
