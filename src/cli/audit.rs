use crate::cli::CliContext;
use crate::core::audit_log::{self, AuditEntry};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Show recent provisioning and rotation events
    Log(AuditLogArgs),
    /// Check the hash chain for edits and deletions
    Verify,
}

#[derive(Args, Debug)]
pub struct AuditLogArgs {
    /// Maximum number of entries to display
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// One JSON object per line instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn run(ctx: &CliContext, cmd: AuditCommand) -> Result<()> {
    match cmd {
        AuditCommand::Log(args) => run_log(ctx, args),
        AuditCommand::Verify => run_verify(ctx),
    }
}

fn run_log(ctx: &CliContext, args: AuditLogArgs) -> Result<()> {
    let entries = audit_log::read_log(&ctx.paths, Some(args.limit))?;

    if args.json {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry).context("serialize audit entry")?);
        }
        return Ok(());
    }
    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(
        ["Timestamp", "Action", "Key", "Target", "State", "Actor", "Result"]
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );
    for entry in &entries {
        table.add_row(row(entry));
    }

    println!("{}", table);
    println!("\n{} entries shown.", entries.len());
    Ok(())
}

fn row(entry: &AuditEntry) -> Vec<String> {
    let local: DateTime<Local> = entry.timestamp.into();
    let result = if entry.result.success {
        "OK".to_string()
    } else {
        format!("FAIL: {}", entry.result.error.as_deref().unwrap_or("?"))
    };
    vec![
        local.format("%Y-%m-%d %H:%M:%S").to_string(),
        entry.action.clone(),
        entry.key.clone(),
        entry.target.clone().unwrap_or_else(|| "-".into()),
        entry.state.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
        entry.actor.clone(),
        result,
    ]
}

fn run_verify(ctx: &CliContext) -> Result<()> {
    let (total, errors) = audit_log::verify_chain(&ctx.paths)?;

    if total == 0 && errors.is_empty() {
        println!("No audit entries to verify.");
        return Ok(());
    }

    for err in &errors {
        println!("  [FAIL] {}", err);
    }

    println!();
    if errors.is_empty() {
        println!("Audit chain: {} entries verified, 0 errors", total);
        Ok(())
    } else {
        println!("Audit chain: {} entries, {} errors", total, errors.len());
        std::process::exit(1);
    }
}
