//! Daemon configuration
//!
//! Layers, lowest first: the embedded `config/gateway.toml`, the file given
//! with `--config`, environment variables, command-line flags. Clap merges
//! the last two; this module merges the files and applies the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use uagw_auth::CredentialStore;
use uagw_core::{GatewayPolicy, Secret};
use uagw_gateway::{BuildFailurePolicy, BuildInfo, GatewayConfig, RetryPolicy, ServerSettings};

const DEFAULT_CONFIG: &str = include_str!("../config/gateway.toml");

/// Boolean flags follow the deployment convention: only the exact string
/// `true` enables them.
pub fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(value == "true")
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub hostname: Option<String>,
    pub resource_path: Option<String>,
    pub application_name: Option<String>,
    pub application_uri: Option<String>,
    pub product_name: Option<String>,
    pub product_uri: Option<String>,
    pub build_number: Option<String>,
    pub pki_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecuritySection {
    pub allow_anonymous: Option<bool>,
    pub require_certificate: Option<bool>,
    pub auto_accept_unknown_certificates: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSection {
    pub endpoint: Option<String>,
    pub connect_attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressSpaceSection {
    pub on_build_failure: Option<BuildFailurePolicy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserEntry {
    pub name: String,
    pub secret: Secret,
}

/// Contents of one TOML configuration file; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub address_space: AddressSpaceSection,
    /// Replaces the lower layer's table as a whole when present
    pub users: Option<Vec<UserEntry>>,
}

macro_rules! layer {
    ($top:expr, $base:expr; $($field:ident),+ $(,)?) => {
        $( $top.$field = $top.$field.take().or($base.$field); )+
    };
}

impl FileConfig {
    /// The built-in defaults
    pub fn embedded() -> Result<Self> {
        Self::parse(DEFAULT_CONFIG).context("Built-in default configuration is invalid")
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Layer `top` over `self`; keys set in `top` win
    pub fn overlay(self, mut top: FileConfig) -> FileConfig {
        layer!(top.server, self.server;
            port, hostname, resource_path, application_name, application_uri,
            product_name, product_uri, build_number, pki_dir);
        layer!(top.security, self.security;
            allow_anonymous, require_certificate, auto_accept_unknown_certificates);
        layer!(top.backend, self.backend;
            endpoint, connect_attempts, backoff_ms, max_backoff_ms);
        layer!(top.address_space, self.address_space; on_build_failure);
        layer!(top, self; users);
        top
    }
}

/// Values from environment variables and flags
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub hostname: Option<String>,
    pub backend_endpoint: Option<String>,
    pub allow_anonymous: Option<bool>,
    pub require_certificate: Option<bool>,
    pub auto_accept_unknown_certificates: Option<bool>,
    pub pki_dir: Option<PathBuf>,
    pub connect_attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
}

/// Fully resolved daemon settings
#[derive(Debug)]
pub struct Settings {
    pub gateway: GatewayConfig,
    pub credentials: CredentialStore,
}

/// Apply `overrides` over `file` and build the gateway configuration
pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Settings> {
    let server_defaults = ServerSettings::default();
    let build_defaults = BuildInfo::default();
    let retry_defaults = RetryPolicy::default();

    let server = file.server;
    let build_info = BuildInfo {
        product_name: server.product_name.unwrap_or(build_defaults.product_name),
        product_uri: server.product_uri.unwrap_or(build_defaults.product_uri),
        manufacturer_name: build_defaults.manufacturer_name,
        build_number: server.build_number.unwrap_or(build_defaults.build_number),
        build_date: Utc::now(),
    };
    let settings = ServerSettings {
        hostname: overrides
            .hostname
            .or(server.hostname)
            .unwrap_or(server_defaults.hostname),
        port: overrides.port.or(server.port).unwrap_or(server_defaults.port),
        resource_path: server
            .resource_path
            .unwrap_or(server_defaults.resource_path),
        application_name: server
            .application_name
            .unwrap_or(server_defaults.application_name),
        application_uri: server
            .application_uri
            .unwrap_or(server_defaults.application_uri),
        build_info,
        pki_dir: overrides
            .pki_dir
            .or(server.pki_dir)
            .unwrap_or(server_defaults.pki_dir),
    };

    let security = file.security;
    let allow_anonymous = overrides
        .allow_anonymous
        .or(security.allow_anonymous)
        .unwrap_or(false);
    let require_certificate = overrides
        .require_certificate
        .or(security.require_certificate)
        .unwrap_or(false);
    let auto_accept = overrides
        .auto_accept_unknown_certificates
        .or(security.auto_accept_unknown_certificates)
        .unwrap_or(allow_anonymous);
    let policy =
        GatewayPolicy::from_flags(allow_anonymous, require_certificate).with_auto_accept(auto_accept);

    let backend = file.backend;
    let retry = RetryPolicy::bounded(
        overrides
            .connect_attempts
            .or(backend.connect_attempts)
            .unwrap_or(retry_defaults.max_attempts),
        overrides
            .backoff_ms
            .or(backend.backoff_ms)
            .map(Duration::from_millis)
            .unwrap_or(retry_defaults.initial_backoff),
        backend
            .max_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(retry_defaults.max_backoff),
    );

    let credentials = CredentialStore::from_entries(
        file.users
            .unwrap_or_default()
            .into_iter()
            .map(|u| (u.name, u.secret)),
    )
    .context("Invalid [[users]] table")?;

    Ok(Settings {
        gateway: GatewayConfig {
            backend_endpoint: overrides
                .backend_endpoint
                .or(backend.endpoint)
                .unwrap_or_else(|| GatewayConfig::default().backend_endpoint),
            server: settings,
            policy,
            retry,
            on_build_failure: file.address_space.on_build_failure.unwrap_or_default(),
        },
        credentials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn embedded() -> FileConfig {
        FileConfig::embedded().unwrap()
    }

    #[test]
    fn test_parse_flag_only_exact_true() {
        assert_eq!(parse_flag("true"), Ok(true));
        assert_eq!(parse_flag("TRUE"), Ok(false));
        assert_eq!(parse_flag("1"), Ok(false));
        assert_eq!(parse_flag("yes"), Ok(false));
        assert_eq!(parse_flag(""), Ok(false));
    }

    #[test]
    fn test_embedded_defaults() {
        let settings = resolve(embedded(), Overrides::default()).unwrap();
        let gw = &settings.gateway;
        assert_eq!(gw.server.port, 4840);
        assert_eq!(gw.server.resource_path, "/UA/Gateway");
        assert_eq!(gw.backend_endpoint, "opc.tcp://opcua-simulator:4841");
        assert!(!gw.policy.allow_anonymous);
        assert!(!gw.policy.auto_accept_unknown_certificates);
        assert_eq!(gw.retry.max_attempts, 1);
        assert_eq!(gw.on_build_failure, BuildFailurePolicy::Degrade);
        assert_eq!(
            settings.credentials.usernames(),
            vec!["opcua-admin", "opcua-operator", "opcua-reader"]
        );
    }

    #[test]
    fn test_overrides_beat_file() {
        let file = embedded().overlay(
            FileConfig::parse("[server]\nport = 5000\n[backend]\nendpoint = \"opc.tcp://plc:4840\"\n")
                .unwrap(),
        );
        let overrides = Overrides {
            port: Some(6000),
            ..Default::default()
        };
        let settings = resolve(file, overrides).unwrap();
        assert_eq!(settings.gateway.server.port, 6000);
        assert_eq!(settings.gateway.backend_endpoint, "opc.tcp://plc:4840");
    }

    #[test]
    fn test_overlay_keeps_lower_layer_keys() {
        let file = embedded().overlay(FileConfig::parse("[server]\nport = 4850\n").unwrap());
        assert_eq!(file.server.port, Some(4850));
        assert_eq!(file.server.resource_path.as_deref(), Some("/UA/Gateway"));
        assert_eq!(file.users.map(|u| u.len()), Some(3));
    }

    #[test]
    fn test_overlay_replaces_users() {
        let file = embedded().overlay(
            FileConfig::parse("[[users]]\nname = \"svc\"\nsecret = \"s3cret\"\n").unwrap(),
        );
        let settings = resolve(file, Overrides::default()).unwrap();
        assert_eq!(settings.credentials.usernames(), vec!["svc"]);
    }

    #[test]
    fn test_auto_accept_follows_anonymous() {
        let overrides = Overrides {
            allow_anonymous: Some(true),
            ..Default::default()
        };
        let policy = resolve(embedded(), overrides).unwrap().gateway.policy;
        assert!(policy.allow_anonymous);
        assert!(policy.auto_accept_unknown_certificates);
        assert_eq!(policy.mode_label(), "dev");
    }

    #[test]
    fn test_auto_accept_can_be_split() {
        let overrides = Overrides {
            allow_anonymous: Some(true),
            auto_accept_unknown_certificates: Some(false),
            ..Default::default()
        };
        let policy = resolve(embedded(), overrides).unwrap().gateway.policy;
        assert!(policy.allow_anonymous);
        assert!(!policy.auto_accept_unknown_certificates);
    }

    #[test]
    fn test_duplicate_users_rejected() {
        let file = FileConfig::parse(
            "[[users]]\nname = \"a\"\nsecret = \"x\"\n[[users]]\nname = \"a\"\nsecret = \"y\"\n",
        )
        .unwrap();
        assert!(resolve(file, Overrides::default()).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(FileConfig::parse("[server]\nprot = 1\n").is_err());
    }

    #[test]
    fn test_keep_partial_and_retry_from_file() {
        let file = FileConfig::parse(
            "[backend]\nconnect_attempts = 4\nbackoff_ms = 100\n[address_space]\non_build_failure = \"keep-partial\"\n",
        )
        .unwrap();
        let gw = resolve(file, Overrides::default()).unwrap().gateway;
        assert_eq!(gw.retry.max_attempts, 4);
        assert_eq!(gw.retry.initial_backoff, Duration::from_millis(100));
        assert_eq!(gw.on_build_failure, BuildFailurePolicy::KeepPartial);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[security]\nrequire_certificate = true").unwrap();
        let loaded = FileConfig::load(file.path()).unwrap();
        assert_eq!(loaded.security.require_certificate, Some(true));

        assert!(FileConfig::load(Path::new("/nonexistent/gateway.toml")).is_err());
    }
}
