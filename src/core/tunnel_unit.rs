//! systemd unit for the managed tunnel.

use crate::constants;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelUnit {
    pub description: String,
    pub ssh_config_path: PathBuf,
    pub host_identifier: String,
    pub user: String,
}

impl TunnelUnit {
    pub fn new(ssh_config_path: &Path, host_identifier: &str, user: &str) -> Self {
        Self {
            description: constants::TUNNEL_SERVICE_DESCRIPTION.to_string(),
            ssh_config_path: ssh_config_path.to_path_buf(),
            host_identifier: host_identifier.to_string(),
            user: user.to_string(),
        }
    }

    /// `ssh -N` against the stanza written by `ssh_config::configure_tunnel`.
    pub fn exec_start(&self) -> String {
        format!(
            "/usr/bin/ssh -N -F {} -o ExitOnForwardFailure=yes -o ServerAliveInterval=30 {}",
            self.ssh_config_path.display(),
            self.host_identifier
        )
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("[Unit]\n");
        out.push_str(&format!("Description={}\n", self.description));
        out.push_str("After=network-online.target\n");
        out.push_str("Wants=network-online.target\n");
        out.push('\n');
        out.push_str("[Service]\n");
        out.push_str(&format!("ExecStart={}\n", self.exec_start()));
        out.push_str("Restart=always\n");
        out.push_str("RestartSec=10\n");
        out.push_str(&format!("User={}\n", self.user));
        out.push('\n');
        out.push_str("[Install]\n");
        out.push_str("WantedBy=multi-user.target\n");
        out
    }

    pub fn unit_path(unit_dir: &Path) -> PathBuf {
        unit_dir.join(format!("{}.service", constants::TUNNEL_SERVICE_NAME))
    }
}
