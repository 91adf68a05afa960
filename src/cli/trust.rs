//! `trust scan`: fetch a server's host key for pinning.

use super::CliContext;
use crate::constants;
use crate::core::audit_log::AuditRecord;
use crate::models::remote::RemoteTarget;
use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum TrustCommand {
    /// Print the host key a server presents, without authenticating
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Server to scan [default: rotate.server_name]
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Pin the scanned key as settings.trusted_host_key
    #[arg(long)]
    pub save: bool,
}

pub fn run(ctx: &CliContext, command: TrustCommand) -> Result<()> {
    match command {
        TrustCommand::Scan(args) => scan(ctx, args),
    }
}

fn scan(ctx: &CliContext, args: ScanArgs) -> Result<()> {
    let rotate = &ctx.config.rotate;
    let host = args
        .host
        .or_else(|| rotate.server_name.clone())
        .ok_or_else(|| anyhow!("no host given and rotate.server_name is not configured"))?;
    let port = args
        .port
        .or(rotate.server_port)
        .unwrap_or(constants::DEFAULT_SSH_PORT);
    let target = RemoteTarget::new(host, port);

    let fingerprint = ctx.connector()?.scan_host_key(&target)?;
    println!("{}", fingerprint);

    if args.save {
        // refuses to overwrite a config it could not parse
        ctx.config()?;
        ctx.store.update(|file| {
            file.settings.trusted_host_key = Some(fingerprint.clone());
        })?;
        ctx.audit(
            AuditRecord::new("trust-pin", ctx.store.path().display().to_string())
                .target(target.to_string())
                .public_key(fingerprint.clone()),
            Ok(()),
        );
        eprintln!(
            "Pinned in {}. Verify it out of band before relying on it.",
            ctx.store.path().display()
        );
    }
    Ok(())
}
