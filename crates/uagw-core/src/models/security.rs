//! Security policy and message security mode models

use std::fmt;

use serde::{Deserialize, Serialize};

/// Cryptographic algorithm suite negotiated on a secure channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityPolicy {
    /// No signing or encryption
    None,
    /// 256-bit RSA/SHA-256 suite, usable for signing and encryption
    Basic256Sha256,
}

impl SecurityPolicy {
    /// Policy URI as used on the wire
    pub fn uri(&self) -> &'static str {
        match self {
            SecurityPolicy::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            SecurityPolicy::Basic256Sha256 => {
                "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256"
            }
        }
    }

    /// Whether a channel using this policy may run in `mode`.
    ///
    /// `None` only pairs with mode `None`; every real policy requires
    /// at least signing.
    pub fn supports(&self, mode: MessageSecurityMode) -> bool {
        match self {
            SecurityPolicy::None => mode == MessageSecurityMode::None,
            SecurityPolicy::Basic256Sha256 => mode != MessageSecurityMode::None,
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityPolicy::None => write!(f, "None"),
            SecurityPolicy::Basic256Sha256 => write!(f, "Basic256Sha256"),
        }
    }
}

/// Message protection level of a secure channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageSecurityMode {
    None,
    Sign,
    SignAndEncrypt,
}

impl fmt::Display for MessageSecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageSecurityMode::None => write!(f, "None"),
            MessageSecurityMode::Sign => write!(f, "Sign"),
            MessageSecurityMode::SignAndEncrypt => write!(f, "SignAndEncrypt"),
        }
    }
}

/// A {policy, mode} pair as negotiated by one client channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointSecurity {
    pub policy: SecurityPolicy,
    pub mode: MessageSecurityMode,
}

impl EndpointSecurity {
    /// Unsecured channel
    pub const NONE: EndpointSecurity = EndpointSecurity {
        policy: SecurityPolicy::None,
        mode: MessageSecurityMode::None,
    };

    pub fn new(policy: SecurityPolicy, mode: MessageSecurityMode) -> Self {
        Self { policy, mode }
    }

    /// Whether the pair is a valid OPC-UA combination
    pub fn is_coherent(&self) -> bool {
        self.policy.supports(self.mode)
    }

    /// Whether the channel carries a client application certificate
    pub fn is_secure(&self) -> bool {
        self.mode != MessageSecurityMode::None
    }
}

impl fmt::Display for EndpointSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.policy, self.mode)
    }
}
