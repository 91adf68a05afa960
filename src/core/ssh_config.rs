//! `Host` stanzas in an OpenSSH client config file.

use crate::constants;
use crate::error::{IoContext, Result};
use crate::models::tunnel::TunnelEndpoint;
use crate::util::fs as warden_fs;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// The stanza that brings up the reverse tunnel for `host_identifier`.
pub fn host_block(
    host_identifier: &str,
    endpoint: &TunnelEndpoint,
    identity_file: &Path,
) -> String {
    format!(
        "\nHost {}\n    HostName {}\n    User {}\n    IdentityFile {}\n    RemoteForward {}:{} localhost:{}\n",
        host_identifier,
        endpoint.remote_host,
        endpoint.remote_user,
        identity_file.display(),
        endpoint.local_host,
        endpoint.local_port,
        endpoint.remote_port,
    )
}

/// Whether a line reads exactly `Host <host_identifier>`, ignoring
/// surrounding whitespace.
pub fn host_configured(config: &str, host_identifier: &str) -> bool {
    config.lines().any(|line| {
        let mut words = line.split_whitespace();
        matches!(
            (words.next(), words.next(), words.next()),
            (Some("Host"), Some(id), None) if id == host_identifier
        )
    })
}

/// Append the stanza unless the host is already configured. Creates the file
/// if it does not exist. Returns whether anything was written.
pub fn configure_tunnel(
    ssh_config_path: &Path,
    host_identifier: &str,
    endpoint: &TunnelEndpoint,
    identity_file: &Path,
) -> Result<bool> {
    let existing = if ssh_config_path.exists() {
        fs::read_to_string(ssh_config_path)
            .io_context(|| format!("read {}", ssh_config_path.display()))?
    } else {
        String::new()
    };

    if host_configured(&existing, host_identifier) {
        debug!(host = host_identifier, "host already configured");
        return Ok(false);
    }

    let created = !ssh_config_path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(ssh_config_path)
        .io_context(|| format!("open {}", ssh_config_path.display()))?;
    file.write_all(host_block(host_identifier, endpoint, identity_file).as_bytes())
        .io_context(|| format!("write {}", ssh_config_path.display()))?;
    if created {
        warden_fs::set_permissions(ssh_config_path, constants::UNIT_FILE_MODE)?;
    }
    info!(
        host = host_identifier,
        path = %ssh_config_path.display(),
        "tunnel host added to SSH config"
    );
    Ok(true)
}
