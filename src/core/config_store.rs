use crate::constants;
use crate::core::file_lock::FileLock;
use crate::core::paths::WardenPaths;
use crate::error::{Error, IoContext, Result};
use crate::models::config::{ClientSection, RotateSection, TunnelSection, WardenFile};
use crate::util::fs as warden_fs;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads and atomically rewrites warden.toml under the warden root.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl ConfigStore {
    pub fn new(paths: &WardenPaths) -> Self {
        Self {
            path: paths.config.clone(),
            lock_path: paths.config_lock.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// A missing file reads as an empty configuration.
    pub fn load(&self) -> Result<WardenFile> {
        if !self.path.exists() {
            return Ok(WardenFile::default());
        }
        let content = fs::read_to_string(&self.path)
            .io_context(|| format!("read config {}", self.path.display()))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("parse {}: {}", self.path.display(), e)))
    }

    /// Temp file in the same directory at 0600, then rename over the target.
    pub fn save(&self, file: &WardenFile) -> Result<()> {
        let content = toml::to_string_pretty(file)
            .map_err(|e| Error::Config(format!("serialize config: {}", e)))?;
        let parent = self.parent();
        warden_fs::ensure_dir(parent, constants::WARDEN_ROOT_MODE)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .io_context(|| format!("create temp file in {}", parent.display()))?;
        tmp.write_all(content.as_bytes())
            .io_context(|| "write config")?;
        tmp.as_file()
            .sync_all()
            .io_context(|| "sync config")?;
        warden_fs::set_permissions(tmp.path(), constants::CONFIG_FILE_MODE)?;
        tmp.persist(&self.path)
            .map_err(|e| Error::io(format!("persist {}", self.path.display()), e.error))?;
        debug!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    /// Load, apply `f`, save, all under the config lock. Sections `f` does
    /// not touch are written back unchanged.
    pub fn update<F>(&self, f: F) -> Result<WardenFile>
    where
        F: FnOnce(&mut WardenFile),
    {
        warden_fs::ensure_dir(self.parent(), constants::WARDEN_ROOT_MODE)?;
        let _lock = FileLock::exclusive(&self.lock_path)?;
        let mut file = self.load()?;
        f(&mut file);
        self.save(&file)?;
        Ok(file)
    }

    /// Replace `[rotate]` with the baseline for the next rotation.
    pub fn store_rotation(&self, section: &RotateSection) -> Result<()> {
        self.update(|file| file.rotate = section.clone())?;
        Ok(())
    }

    pub fn store_client(&self, client: &ClientSection, rotate: &RotateSection) -> Result<()> {
        self.update(|file| {
            file.client = client.clone();
            file.rotate = rotate.clone();
        })?;
        Ok(())
    }

    pub fn store_tunnel(&self, tunnel: &TunnelSection) -> Result<()> {
        self.update(|file| file.tunnel = tunnel.clone())?;
        Ok(())
    }

    fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(&WardenPaths::from_root(dir.path().join("warden")))
    }

    fn baseline() -> RotateSection {
        RotateSection {
            key_name: Some("id_old".into()),
            key_directory: Some(PathBuf::from("/home/alice/.ssh")),
            key_comment: Some("alice@client".into()),
            server_name: Some("203.0.113.5".into()),
            server_port: Some(22),
            server_user: Some("alice".into()),
        }
    }

    #[test]
    fn test_missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let file = store(&dir).load().unwrap();
        assert!(file.rotate.key_name.is_none());
    }

    #[test]
    fn test_store_rotation_preserves_other_sections() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .update(|f| f.settings.trusted_host_key = Some("ssh-ed25519 AAAA".into()))
            .unwrap();
        store.store_rotation(&baseline()).unwrap();

        let file = store.load().unwrap();
        assert_eq!(file.rotate, baseline());
        assert_eq!(file.settings.trusted_host_key.as_deref(), Some("ssh-ed25519 AAAA"));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.store_rotation(&baseline()).unwrap();
        assert_eq!(warden_fs::mode_of(store.path()).unwrap(), 0o600);
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "[rotate\nkey_name = ").unwrap();
        assert!(matches!(store.load(), Err(Error::Config(_))));
    }
}
