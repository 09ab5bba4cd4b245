//! uagwd - OPC-UA Security Gateway daemon
//!
//! Puts authentication in front of an OPC-UA server that has none. Clients
//! connect to the gateway; the gateway holds one unsecured link to the
//! backend.
//!
//! Usage:
//!   uagwd [OPTIONS]
//!
//! Every option can also be set through the environment variable shown in
//! `uagwd --help`. With no options the built-in configuration is used.

mod config;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uagw_auth::PkiDirectory;
use uagw_gateway::Gateway;
use uagw_stack::{create_stack, StackKind};

use crate::config::{parse_flag, FileConfig, Overrides};

const DEFAULT_LOG_FILTER: &str = "uagwd=info,uagw_gateway=info,uagw_auth=info,uagw_stack=info";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "uagwd")]
#[command(author, version, about = "OPC-UA Security Gateway")]
struct Cli {
    /// Configuration file (TOML), layered over the built-in defaults
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port the gateway listens on
    #[arg(short, long, env = "GATEWAY_PORT")]
    port: Option<u16>,

    /// Host name advertised in the endpoint URL
    #[arg(long, env = "GATEWAY_HOSTNAME")]
    hostname: Option<String>,

    /// Backend server endpoint URL
    #[arg(short, long, env = "BACKEND_ENDPOINT")]
    backend: Option<String>,

    /// Admit anonymous clients (dev mode)
    #[arg(long, env = "ALLOW_ANONYMOUS", value_parser = parse_flag,
          num_args = 0..=1, default_missing_value = "true")]
    allow_anonymous: Option<bool>,

    /// Require a client certificate (not enforced; logged only)
    #[arg(long, env = "REQUIRE_CERTIFICATE", value_parser = parse_flag,
          num_args = 0..=1, default_missing_value = "true")]
    require_certificate: Option<bool>,

    /// Accept client certificates that are neither trusted nor rejected
    /// [default: same as --allow-anonymous]
    #[arg(long, env = "AUTO_ACCEPT_UNKNOWN_CERTIFICATES", value_parser = parse_flag,
          num_args = 0..=1, default_missing_value = "true")]
    auto_accept_unknown_certificates: Option<bool>,

    /// PKI directory (own, trusted, rejected and issuer certificates)
    #[arg(long, env = "PKI_DIR")]
    pki_dir: Option<PathBuf>,

    /// Backend connect attempts before starting degraded
    #[arg(long, env = "BACKEND_CONNECT_ATTEMPTS")]
    connect_attempts: Option<u32>,

    /// Delay before the second connect attempt, in milliseconds
    #[arg(long, env = "BACKEND_RETRY_BACKOFF_MS")]
    backoff_ms: Option<u64>,

    /// Protocol stack [opcua when built with the `opcua` feature, else loopback]
    #[arg(long, env = "GATEWAY_STACK", default_value_t = StackKind::default())]
    stack: StackKind,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            hostname: self.hostname.clone(),
            backend_endpoint: self.backend.clone(),
            allow_anonymous: self.allow_anonymous,
            require_certificate: self.require_certificate,
            auto_accept_unknown_certificates: self.auto_accept_unknown_certificates,
            pki_dir: self.pki_dir.clone(),
            connect_attempts: self.connect_attempts,
            backoff_ms: self.backoff_ms,
        }
    }
}

/// Parse the command line.
///
/// `--help` and `--version` print and exit 0 right here. Every other parse
/// error (a malformed `GATEWAY_PORT`, say) is returned so the caller can
/// treat it as a fatal startup error.
fn parse_cli<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(cli),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => Err(e),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut file = FileConfig::embedded()?;
    if let Some(path) = &cli.config {
        info!(path = %path.display(), "Loading config");
        file = file.overlay(FileConfig::load(path)?);
    }
    let settings = config::resolve(file, cli.overrides())?;
    let gateway_config = &settings.gateway;
    let policy = &gateway_config.policy;

    info!(
        product = %gateway_config.server.build_info.product_name,
        build = %gateway_config.server.build_info.build_number,
        port = gateway_config.server.port,
        endpoint = %gateway_config.server.endpoint_url(),
        backend = %gateway_config.backend_endpoint,
        mode = policy.mode_label(),
        allow_anonymous = policy.allow_anonymous,
        auto_accept_certificates = policy.auto_accept_unknown_certificates,
        require_certificate = policy.require_certificate,
        users = settings.credentials.len(),
        stack = %cli.stack,
        "Starting OPC-UA Security Gateway"
    );

    let pki = PkiDirectory::new(gateway_config.server.pki_dir.clone());
    let created = pki.ensure().context("Failed to prepare PKI directory")?;
    debug!(root = %pki.root().display(), created = created.len(), "PKI directory ready");

    if cli.stack == StackKind::Loopback {
        warn!("Running on the loopback stack: no network listener, simulated backend");
    }
    let stack = create_stack(cli.stack, &gateway_config.server)?;
    let gateway = Gateway::new(
        settings.gateway,
        Arc::new(settings.credentials),
        Arc::new(pki),
        stack.client,
        stack.transport,
    );
    let running = gateway.start().await?;

    shutdown_signal().await;

    let report = running.shutdown().await;
    if !report.is_clean() {
        warn!(steps = ?report.steps, "Shutdown completed with errors");
    }
    info!("Gateway stopped");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match parse_cli(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Gateway failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: &[&str] = &[
        "GATEWAY_CONFIG",
        "GATEWAY_PORT",
        "GATEWAY_HOSTNAME",
        "BACKEND_ENDPOINT",
        "ALLOW_ANONYMOUS",
        "REQUIRE_CERTIFICATE",
        "AUTO_ACCEPT_UNKNOWN_CERTIFICATES",
        "PKI_DIR",
        "BACKEND_CONNECT_ATTEMPTS",
        "BACKEND_RETRY_BACKOFF_MS",
        "GATEWAY_STACK",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_no_args() {
        clear_env();
        let cli = Cli::try_parse_from(["uagwd"]).unwrap();
        assert_eq!(cli.port, None);
        assert_eq!(cli.allow_anonymous, None);
        assert_eq!(cli.stack, StackKind::default());
    }

    #[cfg(not(feature = "opcua"))]
    #[test]
    #[serial]
    fn test_no_args_default_stack_starts_without_network_feature() {
        clear_env();
        let cli = parse_cli(["uagwd"]).unwrap();
        assert_eq!(cli.stack, StackKind::Loopback);
        assert!(create_stack(cli.stack, &uagw_gateway::ServerSettings::default()).is_ok());
    }

    #[test]
    #[serial]
    fn test_malformed_env_is_a_startup_error() {
        clear_env();
        std::env::set_var("GATEWAY_PORT", "abc");
        let port = parse_cli(["uagwd"]);
        clear_env();
        std::env::set_var("BACKEND_CONNECT_ATTEMPTS", "-1");
        let attempts = parse_cli(["uagwd"]);
        clear_env();

        for result in [port, attempts] {
            let err = result.unwrap_err();
            assert!(!matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ));
        }
    }

    #[test]
    #[serial]
    fn test_env_flags() {
        clear_env();
        std::env::set_var("ALLOW_ANONYMOUS", "true");
        std::env::set_var("REQUIRE_CERTIFICATE", "True");
        std::env::set_var("GATEWAY_PORT", "4850");
        let cli = Cli::try_parse_from(["uagwd"]).unwrap();
        clear_env();

        assert_eq!(cli.allow_anonymous, Some(true));
        assert_eq!(cli.require_certificate, Some(false));
        assert_eq!(cli.port, Some(4850));
    }

    #[test]
    #[serial]
    fn test_flag_beats_env() {
        clear_env();
        std::env::set_var("BACKEND_ENDPOINT", "opc.tcp://from-env:4840");
        let cli = Cli::try_parse_from(["uagwd", "--backend", "opc.tcp://from-flag:4840"]).unwrap();
        clear_env();
        assert_eq!(cli.backend.as_deref(), Some("opc.tcp://from-flag:4840"));
    }

    #[test]
    #[serial]
    fn test_bare_flag_means_true() {
        clear_env();
        let cli = Cli::try_parse_from(["uagwd", "--allow-anonymous", "--stack", "loopback"]).unwrap();
        assert_eq!(cli.allow_anonymous, Some(true));
        assert_eq!(cli.stack, StackKind::Loopback);
    }

    #[tokio::test]
    #[serial]
    async fn test_run_fails_on_bad_config_path() {
        clear_env();
        let cli = Cli::try_parse_from(["uagwd", "--config", "/nonexistent/gateway.toml"]).unwrap();
        assert!(run(cli).await.is_err());
    }
}
