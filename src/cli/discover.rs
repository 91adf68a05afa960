//! `discover`: TCP reachability probe.

use super::CliContext;
use crate::constants;
use crate::remote::discovery;
use anyhow::{anyhow, Result};
use clap::Args;

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Server to probe [default: rotate.server_name]
    #[arg(long)]
    pub host: Option<String>,

    /// Port to probe [default: rotate.server_port, else 22]
    #[arg(long)]
    pub port: Option<u16>,
}

pub fn run(ctx: &CliContext, args: DiscoverArgs) -> Result<()> {
    let rotate = &ctx.config.rotate;
    let host = args
        .host
        .or_else(|| rotate.server_name.clone())
        .ok_or_else(|| anyhow!("no host given and rotate.server_name is not configured"))?;
    let port = args
        .port
        .or(rotate.server_port)
        .unwrap_or(constants::DEFAULT_SSH_PORT);

    if discovery::discover_remote(&host, port) {
        println!("{}:{} reachable", host, port);
        Ok(())
    } else {
        println!("{}:{} unreachable", host, port);
        std::process::exit(1);
    }
}
