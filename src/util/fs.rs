use crate::error::{IoContext, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

/// Create `path` (and parents) with `mode` if missing. An existing directory
/// keeps its permissions.
pub fn ensure_dir(path: &Path, mode: u32) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).io_context(|| format!("create directory {}", path.display()))?;
    set_permissions(path, mode)
}

pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(mode);
        fs::set_permissions(path, perm)
            .io_context(|| format!("set permissions {:o} on {}", mode, path.display()))?;
    }
    Ok(())
}

/// Permission bits of `path`, masked to 0o777.
#[cfg(unix)]
pub fn mode_of(path: &Path) -> Result<u32> {
    let meta = fs::metadata(path).io_context(|| format!("stat {}", path.display()))?;
    Ok(meta.permissions().mode() & 0o777)
}

/// Write a new file that must not already exist, created with `mode` and
/// then explicitly chmod'ed so the umask cannot widen it.
pub fn write_new_file(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(mode);
    let mut file = options
        .open(path)
        .io_context(|| format!("create {}", path.display()))?;
    file.write_all(contents)
        .io_context(|| format!("write {}", path.display()))?;
    file.sync_all()
        .io_context(|| format!("sync {}", path.display()))?;
    set_permissions(path, mode)
}
