//! `rotate`: replace the configured key pair.

use super::CliContext;
use crate::core::audit_log::AuditRecord;
use crate::core::rotation::{RotationOrchestrator, RotationRequest};
use crate::error::Error;
use crate::models::config::RotateSection;
use crate::models::rotation::RotationState;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub struct RotateArgs {
    #[arg(long)]
    pub key_name: Option<String>,

    #[arg(long, value_name = "DIR")]
    pub key_directory: Option<PathBuf>,

    #[arg(long)]
    pub key_comment: Option<String>,

    #[arg(long)]
    pub server_name: Option<String>,

    #[arg(long)]
    pub server_port: Option<u16>,

    /// Account holding the key in its authorized_keys
    #[arg(long)]
    pub server_user: Option<String>,

    /// Finish a rotation that was interrupted after the new key was authorized
    #[arg(long)]
    pub resume: bool,
}

impl RotateArgs {
    fn merge(&self, base: &RotateSection) -> RotateSection {
        RotateSection {
            key_name: self.key_name.clone().or_else(|| base.key_name.clone()),
            key_directory: self.key_directory.clone().or_else(|| base.key_directory.clone()),
            key_comment: self.key_comment.clone().or_else(|| base.key_comment.clone()),
            server_name: self.server_name.clone().or_else(|| base.server_name.clone()),
            server_port: self.server_port.or(base.server_port),
            server_user: self.server_user.clone().or_else(|| base.server_user.clone()),
        }
    }
}

pub fn run(ctx: &CliContext, args: RotateArgs) -> Result<()> {
    let section = args.merge(&ctx.config()?.rotate);
    let request = RotationRequest::from_section(&section)?;
    let trust = ctx.trust_policy()?;
    let connector = ctx.connector()?;

    let orchestrator = RotationOrchestrator::new(&connector, trust).with_baseline_store(&ctx.store);
    let result = if args.resume {
        orchestrator.resume(&request)
    } else {
        orchestrator.rotate(&request)
    };

    let action = if args.resume { "rotate-resume" } else { "rotate" };
    let key_path = request.canonical().private_key_path.display().to_string();
    let record = AuditRecord::new(action, key_path)
        .target(format!("{}@{}", request.remote_user, request.target));

    match result {
        Ok(outcome) => {
            ctx.audit(
                record.state(outcome.state).public_key(outcome.public_key.clone()),
                Ok(()),
            );
            println!("Rotation {}: {}", outcome.state, outcome.key.private_key_path.display());
            println!("Public key: {}", outcome.public_key);
            if !outcome.baseline_persisted {
                eprintln!(
                    "warning: the new key is live but {} was not updated; fix it before the next rotation",
                    ctx.store.path().display()
                );
            }
            Ok(())
        }
        Err(e) => {
            let state = e.rotation_state().unwrap_or(RotationState::Initial);
            ctx.audit(record.state(state), Err(e.to_string()));
            if matches!(e, Error::Rotation { .. }) && request.journal_path().exists() {
                eprintln!(
                    "hint: the new key is authorized; run `rotate --resume` once the server is reachable"
                );
            }
            Err(e.into())
        }
    }
}
