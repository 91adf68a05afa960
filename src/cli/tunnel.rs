//! `tunnel`: SSH client stanza and systemd service for the reverse tunnel.

use super::CliContext;
use crate::constants;
use crate::core::audit_log::AuditRecord;
use crate::core::ssh_config;
use crate::core::tunnel_unit::TunnelUnit;
use crate::models::config::{require, TunnelSection};
use crate::util::systemd;
use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum TunnelCommand {
    /// Add a Host stanza for the tunnel to an SSH client config
    Configure(ConfigureArgs),
    /// Print the systemd unit for the tunnel
    Unit(UnitArgs),
    /// Install and enable the systemd unit (requires root)
    Install(InstallArgs),
}

impl TunnelCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TunnelCommand::Configure(_) => "tunnel configure",
            TunnelCommand::Unit(_) => "tunnel unit",
            TunnelCommand::Install(_) => "tunnel install",
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ConfigureArgs {
    /// Alias used as the `Host` line
    #[arg(long)]
    pub host_identifier: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub ssh_config_path: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub key_directory: Option<PathBuf>,

    /// Key in the key directory used to open the tunnel
    #[arg(long)]
    pub server_key_name: Option<String>,

    /// Local account that runs the tunnel
    #[arg(long)]
    pub local_user: Option<String>,

    /// Host the forwarded port lands on
    #[arg(long)]
    pub local_host: Option<String>,

    #[arg(long)]
    pub local_port: Option<u16>,

    #[arg(long)]
    pub server_user: Option<String>,

    #[arg(long)]
    pub server_name: Option<String>,

    /// Port opened on the server
    #[arg(long)]
    pub remote_port: Option<u16>,
}

impl ConfigureArgs {
    fn merge(self, base: &TunnelSection) -> TunnelSection {
        TunnelSection {
            host_identifier: self.host_identifier.or_else(|| base.host_identifier.clone()),
            ssh_config_path: self.ssh_config_path.or_else(|| base.ssh_config_path.clone()),
            key_directory: self.key_directory.or_else(|| base.key_directory.clone()),
            server_key_name: self.server_key_name.or_else(|| base.server_key_name.clone()),
            local_user: self.local_user.or_else(|| base.local_user.clone()),
            local_host: self.local_host.or_else(|| base.local_host.clone()),
            local_port: self.local_port.or(base.local_port),
            server_user: self.server_user.or_else(|| base.server_user.clone()),
            server_name: self.server_name.or_else(|| base.server_name.clone()),
            remote_port: self.remote_port.or(base.remote_port),
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct UnitArgs {
    #[arg(long, value_name = "PATH")]
    pub ssh_config_path: Option<PathBuf>,

    #[arg(long)]
    pub host_identifier: Option<String>,

    /// Account the service runs as
    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    #[command(flatten)]
    pub unit: UnitArgs,

    #[arg(long, value_name = "DIR", default_value = constants::SYSTEMD_UNIT_DIR)]
    pub unit_dir: PathBuf,

    /// Write the unit and reload systemd without enabling the service
    #[arg(long)]
    pub no_enable: bool,
}

pub fn run(ctx: &CliContext, command: TunnelCommand) -> Result<()> {
    match command {
        TunnelCommand::Configure(args) => configure(ctx, args),
        TunnelCommand::Unit(args) => {
            print!("{}", build_unit(ctx, args)?.render());
            Ok(())
        }
        TunnelCommand::Install(args) => install(ctx, args),
    }
}

fn configure(ctx: &CliContext, args: ConfigureArgs) -> Result<()> {
    let section = args.merge(&ctx.config()?.tunnel);
    let endpoint = section.endpoint()?;
    let ssh_config_path = section.ssh_config_path.clone().unwrap_or_default();
    let host_identifier = section.host_identifier.clone().unwrap_or_default();
    let identity_file = section
        .identity_file()
        .ok_or_else(|| anyhow!("tunnel identity file is not configured"))?;

    let record = AuditRecord::new("tunnel-configure", identity_file.display().to_string())
        .target(format!(
            "{}@{}:{}",
            endpoint.remote_user, endpoint.remote_host, endpoint.remote_port
        ));
    let written = match ssh_config::configure_tunnel(
        &ssh_config_path,
        &host_identifier,
        &endpoint,
        &identity_file,
    ) {
        Ok(written) => written,
        Err(e) => {
            ctx.audit(record, Err(e.to_string()));
            return Err(e.into());
        }
    };
    ctx.store.store_tunnel(&section)?;
    ctx.audit(record, Ok(()));

    if written {
        println!("Added Host {} to {}", host_identifier, ssh_config_path.display());
    } else {
        println!(
            "Host {} already present in {}, left unchanged",
            host_identifier,
            ssh_config_path.display()
        );
    }
    Ok(())
}

/// Flags first, then the `[tunnel]` section.
fn build_unit(ctx: &CliContext, args: UnitArgs) -> Result<TunnelUnit> {
    let base = &ctx.config()?.tunnel;
    let ssh_config_path = args.ssh_config_path.or_else(|| base.ssh_config_path.clone());
    let host_identifier = args.host_identifier.or_else(|| base.host_identifier.clone());
    let user = args.user.or_else(|| base.local_user.clone());

    let mut missing = Vec::new();
    if ssh_config_path.is_none() {
        missing.push("ssh_config_path");
    }
    if host_identifier.as_deref().unwrap_or("").is_empty() {
        missing.push("host_identifier");
    }
    if user.as_deref().unwrap_or("").is_empty() {
        missing.push("local_user");
    }
    require("tunnel", missing)?;

    Ok(TunnelUnit::new(
        &ssh_config_path.unwrap_or_default(),
        &host_identifier.unwrap_or_default(),
        &user.unwrap_or_default(),
    ))
}

fn install(ctx: &CliContext, args: InstallArgs) -> Result<()> {
    let unit = build_unit(ctx, args.unit)?;
    let path = systemd::install_unit(&unit, &args.unit_dir)?;
    let record = AuditRecord::new("tunnel-install", path.display().to_string())
        .target(unit.host_identifier.clone());

    let activated = systemd::daemon_reload().and_then(|()| {
        if args.no_enable {
            Ok(())
        } else {
            systemd::enable(constants::TUNNEL_SERVICE_NAME)
        }
    });
    if let Err(e) = activated {
        ctx.audit(record, Err(format!("{:#}", e)));
        return Err(e)
            .with_context(|| format!("unit written to {} but not activated", path.display()));
    }
    ctx.audit(record, Ok(()));

    println!("Installed {}", path.display());
    if !args.no_enable {
        println!(
            "Enabled {}.service (start it with `systemctl start {}`)",
            constants::TUNNEL_SERVICE_NAME,
            constants::TUNNEL_SERVICE_NAME
        );
    }
    Ok(())
}
