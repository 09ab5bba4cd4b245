//! Data models shared across the gateway crates

mod address_space;
mod endpoint;
mod identity;
mod policy;
mod security;

pub use address_space::*;
pub use endpoint::*;
pub use identity::*;
pub use policy::*;
pub use security::*;
