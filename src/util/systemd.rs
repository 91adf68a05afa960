use crate::constants;
use crate::core::tunnel_unit::TunnelUnit;
use crate::util::fs as warden_fs;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Write the unit file into `unit_dir` (mode 0644), replacing any previous one.
pub fn install_unit(unit: &TunnelUnit, unit_dir: &Path) -> Result<PathBuf> {
    if !unit_dir.is_dir() {
        bail!("systemd unit directory {} does not exist", unit_dir.display());
    }
    let path = TunnelUnit::unit_path(unit_dir);
    debug!(path = %path.display(), "writing unit file");
    fs::write(&path, unit.render()).with_context(|| format!("write {}", path.display()))?;
    warden_fs::set_permissions(&path, constants::UNIT_FILE_MODE)?;
    Ok(path)
}

pub fn daemon_reload() -> Result<()> {
    let mut cmd = Command::new("systemctl");
    cmd.arg("daemon-reload");
    run(cmd).context("systemctl daemon-reload")
}

pub fn enable(service: &str) -> Result<()> {
    let mut cmd = Command::new("systemctl");
    cmd.arg("enable").arg(service);
    run(cmd).with_context(|| format!("systemctl enable {}", service))
}

fn run(mut cmd: Command) -> Result<()> {
    let output = cmd.output().context("run command")?;
    if output.status.success() {
        return Ok(());
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    bail!("command failed: {}{}", stdout, stderr);
}
