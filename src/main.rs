use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = tunnel_warden::cli::Cli::parse();
    cli.run()
}
