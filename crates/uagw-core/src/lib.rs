//! uagw-core - Core traits and types for the OPC-UA security gateway
//!
//! This crate provides the vocabulary shared by the authentication engine,
//! the gateway control plane and the protocol stack adapters: security
//! policies and modes, client identities, the gateway policy snapshot, the
//! address-space view handed to clients, and the traits a backend OPC-UA
//! client has to implement.

pub mod backend;
pub mod error;
pub mod models;

#[cfg(feature = "mock")]
pub mod mock;

pub use backend::{
    BackendClient, BackendConnection, BackendSession, BrowseResult, EndpointDescription,
    ReferenceDescription,
};
pub use error::{BackendError, BackendResult};
pub use models::*;
