//! On-disk record of a rotation past the point of no easy return.
//!
//! Written once the candidate is authorized remotely, so a crash after that
//! is detectable and `rotate --resume` can finish the job.

use crate::constants;
use crate::error::{Error, IoContext, Result};
use crate::models::rotation::RotationState;
use crate::util::fs as warden_fs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationJournal {
    pub key_name: String,
    pub key_directory: PathBuf,
    pub state: RotationState,
    /// Public key line being replaced.
    pub old_key: String,
    /// Public key line of the candidate.
    pub candidate_key: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RotationJournal {
    pub fn path_for(key_directory: &Path, key_name: &str) -> PathBuf {
        key_directory.join(format!("{}.rotation.json", key_name))
    }

    pub fn begin(key_directory: &Path, key_name: &str, old_key: &str, candidate_key: &str) -> Self {
        let now = Utc::now();
        Self {
            key_name: key_name.to_string(),
            key_directory: key_directory.to_path_buf(),
            state: RotationState::CandidateAuthorized,
            old_key: old_key.to_string(),
            candidate_key: candidate_key.to_string(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn path(&self) -> PathBuf {
        Self::path_for(&self.key_directory, &self.key_name)
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .io_context(|| format!("read rotation journal {}", path.display()))?;
        let journal = serde_json::from_str(&content)
            .map_err(|e| {
                Error::Config(format!("parse rotation journal {}: {}", path.display(), e))
            })?;
        Ok(Some(journal))
    }

    pub fn advance(&mut self, state: RotationState) -> Result<()> {
        self.state = state;
        self.updated_at = Utc::now();
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        let path = self.path();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize rotation journal: {}", e)))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.key_directory)
            .io_context(|| format!("create temp file in {}", self.key_directory.display()))?;
        tmp.write_all(content.as_bytes())
            .io_context(|| "write rotation journal")?;
        tmp.as_file()
            .sync_all()
            .io_context(|| "sync rotation journal")?;
        warden_fs::set_permissions(tmp.path(), constants::CONFIG_FILE_MODE)?;
        tmp.persist(&path)
            .map_err(|e| Error::io(format!("persist {}", path.display()), e.error))?;
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(format!("remove {}", path.display()), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_advance_remove() {
        let dir = TempDir::new().unwrap();
        let mut journal =
            RotationJournal::begin(dir.path(), "id_old", "ssh-rsa AAAA old", "ssh-rsa BBBB new");
        journal.save().unwrap();

        let path = RotationJournal::path_for(dir.path(), "id_old");
        assert!(path.ends_with("id_old.rotation.json"));
        assert_eq!(RotationJournal::load(&path).unwrap().unwrap(), journal);

        journal.advance(RotationState::OldRevoked).unwrap();
        let loaded = RotationJournal::load(&path).unwrap().unwrap();
        assert_eq!(loaded.state, RotationState::OldRevoked);
        #[cfg(unix)]
        assert_eq!(warden_fs::mode_of(&path).unwrap(), 0o600);

        journal.remove().unwrap();
        assert!(RotationJournal::load(&path).unwrap().is_none());
        journal.remove().unwrap();
    }
}
