//! `client`: first-time provisioning of a key on the server.

use super::CliContext;
use crate::constants;
use crate::core::audit_log::AuditRecord;
use crate::core::authorizer;
use crate::core::key_material::{self, KeyMaterial};
use crate::models::config::{require, ClientSection, RotateSection};
use crate::models::key_pair::{validate_key_name, KeyPair};
use crate::models::remote::{validate_remote_user, AuthMethods, RemoteCredential, RemoteTarget};
use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug, Default)]
pub struct ClientArgs {
    /// Label for this client
    #[arg(long)]
    pub name: Option<String>,

    /// File name of the key pair to create
    #[arg(long)]
    pub key_name: Option<String>,

    #[arg(long, value_name = "DIR")]
    pub key_directory: Option<PathBuf>,

    /// Comment written into the public key
    #[arg(long)]
    pub key_comment: Option<String>,

    #[arg(long)]
    pub server_name: Option<String>,

    #[arg(long)]
    pub server_port: Option<u16>,

    /// Account used to log in and install the key
    #[arg(long)]
    pub server_user: Option<String>,

    /// Existing key in the key directory that already opens the server
    #[arg(long)]
    pub server_key_name: Option<String>,

    /// Account whose authorized_keys receives the new key [default: tunneluser]
    #[arg(long)]
    pub authorized_user: Option<String>,

    /// Read the login password from stdin instead of prompting
    #[arg(long)]
    pub password_stdin: bool,
}

impl ClientArgs {
    /// Flags override the `[client]` section field by field.
    fn merge(self, base: &ClientSection) -> ClientSection {
        ClientSection {
            name: self.name.or_else(|| base.name.clone()),
            key_name: self.key_name.or_else(|| base.key_name.clone()),
            key_directory: self.key_directory.or_else(|| base.key_directory.clone()),
            key_comment: self.key_comment.or_else(|| base.key_comment.clone()),
            server_name: self.server_name.or_else(|| base.server_name.clone()),
            server_port: self.server_port.or(base.server_port),
            server_user: self.server_user.or_else(|| base.server_user.clone()),
            server_key_name: self.server_key_name.or_else(|| base.server_key_name.clone()),
            authorized_user: self.authorized_user.or_else(|| base.authorized_user.clone()),
        }
    }
}

pub fn run(ctx: &CliContext, args: ClientArgs) -> Result<()> {
    let password_stdin = args.password_stdin;
    let mut section = args.merge(&ctx.config()?.client);
    require("client", section.missing_fields())?;
    if section.authorized_user.as_deref().map(str::trim).unwrap_or("").is_empty() {
        section.authorized_user = Some(constants::DEFAULT_TUNNEL_USER.to_string());
    }

    let key_name = section.key_name.clone().unwrap_or_default();
    let key_directory = section.key_directory.clone().unwrap_or_default();
    let key_comment = section.key_comment.clone().unwrap_or_default();
    let server_user = section.server_user.clone().unwrap_or_default();
    let authorized_user = section.authorized_user.clone().unwrap_or_default();
    let target = RemoteTarget::new(
        section.server_name.clone().unwrap_or_default(),
        section.server_port.unwrap_or_default(),
    );

    validate_key_name(&key_name)
        .map_err(|e| anyhow::anyhow!("invalid key name '{}': {}", key_name, e))?;
    validate_remote_user(&server_user)?;
    validate_remote_user(&authorized_user)?;

    let existing = KeyPair::locate(&key_directory, &key_name, &key_comment);
    if existing.any_exists() {
        bail!(
            "key pair {} already exists; use `rotate` to replace it",
            existing.private_key_path.display()
        );
    }

    let credential = match &section.server_key_name {
        Some(server_key) => {
            validate_key_name(server_key)
                .map_err(|e| anyhow::anyhow!("invalid server key name '{}': {}", server_key, e))?;
            RemoteCredential::PrivateKey(key_directory.join(server_key))
        }
        None => {
            if ctx.non_interactive && !password_stdin {
                bail!("no server key configured; pass --password-stdin in non-interactive mode");
            }
            let prompt = format!("Password for {}@{}", server_user, target.host);
            RemoteCredential::resolve(Some(super::read_password(password_stdin, &prompt)?), None)?
        }
    };
    let auth = AuthMethods::new(server_user.clone(), credential);
    let trust = ctx.trust_policy()?;
    let connector = ctx.connector()?;

    key_material::ensure_directory(&key_directory)?;
    let pair = KeyMaterial::new().generate(&key_directory, &key_name, &key_comment)?;
    let public_key = key_material::read_public_key(&pair)?;
    let record = AuditRecord::new("client", pair.private_key_path.display().to_string())
        .target(format!("{}@{}", authorized_user, target));

    if let Err(e) =
        authorizer::authorize(&connector, &pair, &target, &authorized_user, &auth, &trust)
    {
        key_material::remove_key_pair(&pair);
        ctx.audit(record, Err(e.to_string()));
        return Err(e).with_context(|| format!("authorize {} on {}", key_name, target));
    }

    let baseline = RotateSection {
        key_name: Some(key_name.clone()),
        key_directory: Some(key_directory.clone()),
        key_comment: Some(key_comment),
        server_name: Some(target.host.clone()),
        server_port: Some(target.port),
        server_user: Some(authorized_user.clone()),
    };
    ctx.store
        .store_client(&section, &baseline)
        .context("key authorized, but saving the configuration failed")?;
    ctx.audit(record.public_key(public_key.clone()), Ok(()));

    info!(key = %pair.private_key_path.display(), %target, "client provisioned");
    println!("Key pair:     {}", pair.private_key_path.display());
    println!("Authorized:   {}@{}", authorized_user, target);
    println!("Public key:   {}", public_key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_section() {
        let base = ClientSection {
            key_name: Some("id_cfg".into()),
            server_name: Some("cfg.example.net".into()),
            server_port: Some(2222),
            ..Default::default()
        };
        let args = ClientArgs {
            key_name: Some("id_flag".into()),
            ..Default::default()
        };
        let merged = args.merge(&base);
        assert_eq!(merged.key_name.as_deref(), Some("id_flag"));
        assert_eq!(merged.server_name.as_deref(), Some("cfg.example.net"));
        assert_eq!(merged.server_port, Some(2222));
        assert!(merged.authorized_user.is_none());
    }
}
