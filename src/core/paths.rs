//! Warden root resolution and the files kept under it.

use crate::constants;
use crate::error::{IoContext, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const ROOT_ENV: &str = "TUNNEL_WARDEN_ROOT";

#[derive(Debug, Clone)]
pub struct WardenPaths {
    pub root: PathBuf,
    pub config: PathBuf,
    pub config_lock: PathBuf,
    pub audit_log: PathBuf,
    pub audit_lock: PathBuf,
}

impl WardenPaths {
    /// `--root`, then `$TUNNEL_WARDEN_ROOT`, then the nearest ancestor of the
    /// working directory holding a warden.toml, then the system default.
    pub fn resolve(root_arg: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = root_arg {
            return Ok(Self::from_root(root));
        }
        if let Ok(root) = env::var(ROOT_ENV) {
            if !root.is_empty() {
                return Ok(Self::from_root(PathBuf::from(root)));
            }
        }
        let cwd = env::current_dir().io_context(|| "resolve current directory")?;
        if let Some(found) = find_config_root(&cwd) {
            return Ok(Self::from_root(found));
        }
        Ok(Self::from_root(PathBuf::from(constants::DEFAULT_WARDEN_ROOT)))
    }

    pub fn from_root(root: PathBuf) -> Self {
        Self {
            config: root.join(constants::CONFIG_FILE_NAME),
            config_lock: root.join("warden.lock"),
            audit_log: root.join("audit.log"),
            audit_lock: root.join("audit.lock"),
            root,
        }
    }
}

fn find_config_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(constants::CONFIG_FILE_NAME).is_file())
        .map(Path::to_path_buf)
}

impl std::fmt::Display for WardenPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "warden@{}", self.root.display())
    }
}
