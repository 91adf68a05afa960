//! Advisory flock(2) locks: one for config writes, one per rotated key.

use crate::error::{Error, IoContext, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock held until drop.
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock is ours.
    pub fn exclusive(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.lock_exclusive()
            .io_context(|| format!("acquire lock {}", path.display()))?;
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// `Ok(None)` if another holder has it.
    pub fn try_exclusive(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                _file: file,
                path: path.to_path_buf(),
            })),
            Err(ref e) if is_contended(e) => Ok(None),
            Err(e) => Err(Error::io(format!("try lock {}", path.display()), e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .io_context(|| format!("open lock file {}", path.display()))
}

fn is_contended(e: &io::Error) -> bool {
    // fs2 may surface EAGAIN as Other rather than WouldBlock
    e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == Some(11)
}

/// Exclusive right to rotate one credential, keyed by key directory and name.
/// A second rotation of the same key is rejected rather than queued.
pub struct RotationLock {
    lock: FileLock,
}

impl RotationLock {
    pub fn lock_path(key_directory: &Path, key_name: &str) -> PathBuf {
        key_directory.join(format!(".{}.rotation.lock", key_name))
    }

    pub fn acquire(key_directory: &Path, key_name: &str) -> Result<Self> {
        let path = Self::lock_path(key_directory, key_name);
        match FileLock::try_exclusive(&path)? {
            Some(lock) => {
                debug!(lock = %path.display(), "rotation lock acquired");
                Ok(Self { lock })
            }
            None => Err(Error::ConcurrentRotation(
                key_directory.join(key_name).display().to_string(),
            )),
        }
    }

    pub fn path(&self) -> &Path {
        self.lock.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_try_exclusive_none_while_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.lock");
        let held = FileLock::exclusive(&path).unwrap();
        assert!(FileLock::try_exclusive(&path).unwrap().is_none());
        drop(held);
        assert!(FileLock::try_exclusive(&path).unwrap().is_some());
    }

    #[test]
    fn test_second_rotation_rejected() {
        let dir = TempDir::new().unwrap();
        let first = RotationLock::acquire(dir.path(), "id_old").unwrap();
        assert!(first.path().ends_with(".id_old.rotation.lock"));

        let err = RotationLock::acquire(dir.path(), "id_old").err().unwrap();
        assert!(matches!(err, Error::ConcurrentRotation(_)), "{:?}", err);

        // other keys are independent
        assert!(RotationLock::acquire(dir.path(), "id_other").is_ok());

        drop(first);
        assert!(RotationLock::acquire(dir.path(), "id_old").is_ok());
    }
}
