//! Client-facing server transport seam
//!
//! The OPC-UA server stack (secure channels, encoding, listener) sits behind
//! [`ServerTransport`]. The gateway hands it the settings, then a
//! [`SessionGate`] that every inbound session must pass.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uagw_core::GatewayPolicy;

use crate::error::TransportError;
use crate::session::SessionGate;

/// Build information advertised in the server status
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub product_name: String,
    pub product_uri: String,
    pub manufacturer_name: String,
    pub build_number: String,
    pub build_date: DateTime<Utc>,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            product_name: "OPC-UA Security Gateway".to_string(),
            product_uri: "urn:uagw:gateway".to_string(),
            manufacturer_name: "uagw".to_string(),
            build_number: "1.0.0".to_string(),
            build_date: Utc::now(),
        }
    }
}

/// Settings of the client-facing server
#[derive(Debug, Clone, Serialize)]
pub struct ServerSettings {
    /// Host name advertised in endpoint URLs
    pub hostname: String,
    pub port: u16,
    pub resource_path: String,
    pub application_name: String,
    pub application_uri: String,
    pub build_info: BuildInfo,
    /// Root of the PKI folder layout shared with the stack
    pub pki_dir: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 4840,
            resource_path: "/UA/Gateway".to_string(),
            application_name: "OPC-UA Security Gateway".to_string(),
            application_uri: "urn:uagw:gateway".to_string(),
            build_info: BuildInfo::default(),
            pki_dir: PathBuf::from("pki"),
        }
    }
}

impl ServerSettings {
    /// `opc.tcp://<hostname>:<port><resource_path>`
    pub fn endpoint_url(&self) -> String {
        format!(
            "opc.tcp://{}:{}{}",
            self.hostname, self.port, self.resource_path
        )
    }
}

/// Server side of the OPC-UA protocol stack
#[async_trait]
pub trait ServerTransport: Send + Sync {
    /// Prepare the server (certificates, endpoints, user tokens) without
    /// accepting connections yet
    async fn initialize(
        &self,
        settings: &ServerSettings,
        policy: &GatewayPolicy,
    ) -> Result<(), TransportError>;

    /// Start accepting sessions. Every session must pass `gate` before it
    /// touches a node.
    async fn start(
        &self,
        settings: ServerSettings,
        gate: Arc<SessionGate>,
    ) -> Result<Box<dyn RunningServer>, TransportError>;
}

/// A started server
#[async_trait]
pub trait RunningServer: Send + Sync {
    fn endpoint_url(&self) -> &str;

    /// Stop accepting sessions and close the listener
    async fn stop(&self) -> Result<(), TransportError>;
}
