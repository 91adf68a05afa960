//! CLI routing and command dispatch.

use crate::core::audit_log::{self, AuditRecord};
use crate::core::config_store::ConfigStore;
use crate::core::paths::WardenPaths;
use crate::models::config::WardenFile;
use crate::models::trust::HostTrustPolicy;
use crate::remote::ssh::SshConnector;
use crate::remote::SessionTimeouts;
use crate::util::privilege;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

pub mod audit;
pub mod client;
pub mod discover;
pub mod doctor;
pub mod rotate;
pub mod trust;
pub mod tunnel;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub paths: WardenPaths,
    pub store: ConfigStore,
    pub config: WardenFile,
    pub config_load_error: Option<String>,
    pub non_interactive: bool,
    pub trust_on_first_use: bool,
    pub trusted_host_key: Option<String>,
}

impl CliContext {
    /// The loaded configuration, or the reason it could not be read.
    pub fn config(&self) -> Result<&WardenFile> {
        match &self.config_load_error {
            Some(e) => Err(anyhow!("{}", e)),
            None => Ok(&self.config),
        }
    }

    pub fn trust_policy(&self) -> Result<HostTrustPolicy> {
        Ok(HostTrustPolicy::from_settings(
            self.trusted_host_key.as_deref(),
            self.trust_on_first_use,
        )?)
    }

    pub fn connector(&self) -> Result<SshConnector> {
        Ok(SshConnector::new(SessionTimeouts::default())?)
    }

    /// Record an action. Audit failures are reported but never fatal.
    pub fn audit(&self, record: AuditRecord, outcome: std::result::Result<(), String>) {
        if let Err(e) = audit_log::append(&self.paths, record, outcome) {
            warn!(error = %e, "audit log write failed");
        }
    }
}

/// Read a secret from stdin or an interactive prompt.
pub fn read_password(from_stdin: bool, prompt: &str) -> Result<Zeroizing<String>> {
    use anyhow::Context;
    use std::io::Read;

    if from_stdin {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read password from stdin")?;
        return Ok(Zeroizing::new(buf.trim_end_matches(['\r', '\n']).to_string()));
    }
    let password = dialoguer::Password::new()
        .with_prompt(prompt)
        .allow_empty_password(false)
        .interact()
        .context("read password from prompt")?;
    Ok(Zeroizing::new(password))
}

#[derive(Parser, Debug)]
#[command(
    name = "tunnel-warden",
    version,
    about = "Provision, rotate and tunnel SSH keys without losing access"
)]
pub struct Cli {
    /// Directory holding warden.toml and the audit log
    #[arg(long, global = true, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Run in non-interactive mode (no prompts, suitable for automation)
    #[arg(long, global = true, env = "TUNNEL_WARDEN_NON_INTERACTIVE")]
    pub non_interactive: bool,

    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Accept unknown host keys and log their fingerprint (insecure)
    #[arg(long, global = true, env = "TUNNEL_WARDEN_TRUST_ON_FIRST_USE")]
    pub trust_on_first_use: bool,

    /// Pinned host key, "<key-type> <base64>" (see `trust scan`)
    #[arg(long, global = true, value_name = "FINGERPRINT")]
    pub trusted_host_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let paths = WardenPaths::resolve(self.root)?;
        let store = ConfigStore::new(&paths);

        let (config, config_load_error) = match store.load() {
            Ok(config) => (config, None),
            Err(e) => (WardenFile::default(), Some(format!("cannot read configuration: {}", e))),
        };

        init_tracing(self.debug || config.settings.debug);
        if let Some(e) = &config_load_error {
            warn!("{}", e);
        }

        let ctx = CliContext {
            trust_on_first_use: self.trust_on_first_use || config.settings.trust_on_first_use,
            trusted_host_key: self
                .trusted_host_key
                .or_else(|| config.settings.trusted_host_key.clone()),
            paths,
            store,
            config,
            config_load_error,
            non_interactive: self.non_interactive,
        };

        if self.command.requires_root() {
            privilege::require_root(self.command.name())?;
        }

        match self.command {
            Commands::Client(args) => client::run(&ctx, args),
            Commands::Rotate(args) => rotate::run(&ctx, args),
            Commands::Tunnel { command } => tunnel::run(&ctx, command),
            Commands::Discover(args) => discover::run(&ctx, args),
            Commands::Trust { command } => trust::run(&ctx, command),
            Commands::Audit { command } => audit::run(&ctx, command),
            Commands::Doctor(args) => doctor::run(&ctx, args),
        }
    }
}

/// Logs go to stderr. `RUST_LOG` overrides the default level.
fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tunnel_warden={},russh=warn", level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a key pair and authorize it on the server
    Client(client::ClientArgs),
    /// Replace the configured key without losing access
    Rotate(rotate::RotateArgs),
    /// Manage the reverse tunnel
    Tunnel {
        #[command(subcommand)]
        command: tunnel::TunnelCommand,
    },
    /// Check whether a server's SSH port is reachable
    Discover(discover::DiscoverArgs),
    /// Host key trust helpers
    Trust {
        #[command(subcommand)]
        command: trust::TrustCommand,
    },
    /// View the audit trail
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommand,
    },
    /// Diagnose configuration and key state (safe, read-only)
    Doctor(doctor::DoctorArgs),
}

impl Commands {
    pub fn requires_root(&self) -> bool {
        matches!(
            self,
            Commands::Tunnel {
                command: tunnel::TunnelCommand::Install(_)
            }
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Commands::Client(_) => "client",
            Commands::Rotate(_) => "rotate",
            Commands::Tunnel { command } => command.name(),
            Commands::Discover(_) => "discover",
            Commands::Trust { .. } => "trust",
            Commands::Audit { .. } => "audit",
            Commands::Doctor(_) => "doctor",
        }
    }
}
