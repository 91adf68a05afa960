//! Root checks for commands that write system files.

use anyhow::{bail, Result};

/// Whether the effective uid is 0.
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

pub fn require_root(action: &str) -> Result<()> {
    if !is_root() {
        bail!("'{}' must run as root (try sudo)", action);
    }
    Ok(())
}

/// Name of the invoking user, seen through sudo.
pub fn invoking_user() -> String {
    std::env::var("SUDO_USER")
        .ok()
        .filter(|u| !u.is_empty())
        .or_else(|| {
            nix::unistd::User::from_uid(nix::unistd::getuid())
                .ok()
                .flatten()
                .map(|u| u.name)
        })
        .unwrap_or_else(|| "unknown".to_string())
}
