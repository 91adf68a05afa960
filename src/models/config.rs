//! warden.toml configuration model.

use crate::error::{Error, Result};
use crate::models::remote::RemoteTarget;
use crate::models::tunnel::TunnelEndpoint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenFile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub rotate: RotateSection,
    #[serde(default)]
    pub tunnel: TunnelSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub debug: bool,
    /// Pinned host identity, `"<key-type> <base64>"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_host_key: Option<String>,
    /// Accept unknown host keys with a warning. Off unless set.
    #[serde(default)]
    pub trust_on_first_use: bool,
}

/// Initial provisioning parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_user: Option<String>,
    /// Existing key (in `key_directory`) that already opens `server_user`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_key_name: Option<String>,
    /// Account whose authorized_keys receives the new key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_user: Option<String>,
}

impl ClientSection {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.key_name) {
            missing.push("key_name");
        }
        if self.key_directory.is_none() {
            missing.push("key_directory");
        }
        if is_blank(&self.key_comment) {
            missing.push("key_comment");
        }
        if is_blank(&self.server_name) {
            missing.push("server_name");
        }
        if self.server_port.unwrap_or(0) == 0 {
            missing.push("server_port");
        }
        if is_blank(&self.server_user) {
            missing.push("server_user");
        }
        missing
    }
}

/// Baseline for the next rotation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotateSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_user: Option<String>,
}

impl RotateSection {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.key_name) {
            missing.push("key_name");
        }
        if self.key_directory.is_none() {
            missing.push("key_directory");
        }
        if is_blank(&self.key_comment) {
            missing.push("key_comment");
        }
        if is_blank(&self.server_name) {
            missing.push("server_name");
        }
        if self.server_port.unwrap_or(0) == 0 {
            missing.push("server_port");
        }
        if is_blank(&self.server_user) {
            missing.push("server_user");
        }
        missing
    }

    /// Fail with the list of missing fields, if any.
    pub fn require(&self) -> Result<()> {
        require("rotate", self.missing_fields())
    }

    pub fn target(&self) -> Option<RemoteTarget> {
        Some(RemoteTarget::new(self.server_name.clone()?, self.server_port?))
    }
}

/// Managed tunnel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_config_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_key_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<u16>,
}

impl TunnelSection {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.ssh_config_path.is_none() {
            missing.push("ssh_config_path");
        }
        if is_blank(&self.host_identifier) {
            missing.push("host_identifier");
        }
        if is_blank(&self.server_name) {
            missing.push("server_name");
        }
        if is_blank(&self.local_user) {
            missing.push("local_user");
        }
        if self.key_directory.is_none() {
            missing.push("key_directory");
        }
        if is_blank(&self.server_key_name) {
            missing.push("server_key_name");
        }
        if is_blank(&self.local_host) {
            missing.push("local_host");
        }
        if self.local_port.unwrap_or(0) == 0 {
            missing.push("local_port");
        }
        if is_blank(&self.server_user) {
            missing.push("server_user");
        }
        if self.remote_port.unwrap_or(0) == 0 {
            missing.push("remote_port");
        }
        missing
    }

    pub fn require(&self) -> Result<()> {
        require("tunnel", self.missing_fields())
    }

    pub fn endpoint(&self) -> Result<TunnelEndpoint> {
        self.require()?;
        Ok(TunnelEndpoint {
            remote_host: self.server_name.clone().unwrap_or_default(),
            remote_port: self.remote_port.unwrap_or_default(),
            remote_user: self.server_user.clone().unwrap_or_default(),
            local_host: self.local_host.clone().unwrap_or_default(),
            local_port: self.local_port.unwrap_or_default(),
        })
    }

    pub fn identity_file(&self) -> Option<PathBuf> {
        let dir = self.key_directory.as_ref()?;
        Some(dir.join(self.server_key_name.as_ref()?))
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

pub fn require(section: &str, missing: Vec<&'static str>) -> Result<()> {
    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::Config(format!(
        "missing required [{}] parameters: {:?}",
        section, missing
    )))
}
