//! uagw-auth - Client authentication for the OPC-UA security gateway
//!
//! The backend server enforces nothing, so every access decision is made
//! here:
//!
//! - [`CredentialStore`]: read-only username → secret table
//! - [`AuthPolicyEngine`]: per-session Allow/Deny decision
//! - [`PkiDirectory`]: on-disk trust store for client certificates
//!
//! All three are built once at startup and shared behind `Arc` without
//! locking.

pub mod credentials;
pub mod engine;
pub mod error;
pub mod pki;

pub use credentials::CredentialStore;
pub use engine::{AuthDecision, AuthPolicyEngine, DenyReason};
pub use error::{AuthError, PkiError};
pub use pki::{CertificateVerdict, CertificateVerifier, PkiDirectory, TrustList, PKI_SUBDIRS};
