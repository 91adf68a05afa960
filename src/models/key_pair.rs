//! On-disk key pair locations.

use crate::constants;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
}

impl KeyAlgorithm {
    /// OpenSSH algorithm identifier used in authorized_keys lines.
    pub fn ssh_name(self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "ssh-rsa",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa => f.write_str("RSA"),
        }
    }
}

/// A private/public key file pair. The files own the key material; this is
/// only where to find it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub algorithm: KeyAlgorithm,
    pub bits: usize,
    pub comment: String,
}

impl KeyPair {
    /// Paths for `<directory>/<name>` and `<directory>/<name>.pub`.
    pub fn locate(directory: &Path, name: &str, comment: &str) -> Self {
        Self {
            private_key_path: directory.join(name),
            public_key_path: directory.join(format!("{}.pub", name)),
            algorithm: KeyAlgorithm::Rsa,
            bits: constants::RSA_KEY_BITS,
            comment: comment.to_string(),
        }
    }

    /// The temporary pair a rotation writes next to the canonical one.
    pub fn candidate_for(directory: &Path, name: &str, comment: &str) -> Self {
        Self::locate(directory, &candidate_name(name), comment)
    }

    pub fn exists(&self) -> bool {
        self.private_key_path.is_file() && self.public_key_path.is_file()
    }

    pub fn any_exists(&self) -> bool {
        self.private_key_path.exists() || self.public_key_path.exists()
    }
}

pub fn candidate_name(name: &str) -> String {
    format!("{}{}", name, constants::CANDIDATE_SUFFIX)
}

/// Key names become file names, so keep them to a safe charset.
pub fn validate_key_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("key name cannot be empty".into());
    }
    if name.contains("..") {
        return Err("path traversal not allowed".into());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err("only [a-zA-Z0-9._-] allowed".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_paths() {
        let pair = KeyPair::locate(Path::new("/home/alice/.ssh"), "id_old", "alice@box");
        assert_eq!(pair.private_key_path, PathBuf::from("/home/alice/.ssh/id_old"));
        assert_eq!(pair.public_key_path, PathBuf::from("/home/alice/.ssh/id_old.pub"));
        assert_eq!(pair.bits, 4096);
        assert_eq!(pair.algorithm.ssh_name(), "ssh-rsa");
    }

    #[test]
    fn test_candidate_paths() {
        let pair = KeyPair::candidate_for(Path::new("/home/alice/.ssh"), "id_old", "c");
        assert_eq!(pair.private_key_path, PathBuf::from("/home/alice/.ssh/id_old.new"));
        assert_eq!(pair.public_key_path, PathBuf::from("/home/alice/.ssh/id_old.new.pub"));
    }

    #[test]
    fn test_validate_key_name() {
        assert!(validate_key_name("id_rsa").is_ok());
        assert!(validate_key_name("tunnel-key.v2").is_ok());
        assert!(validate_key_name("").is_err());
        assert!(validate_key_name("../id").is_err());
        assert!(validate_key_name("a/b").is_err());
        assert!(validate_key_name("a b").is_err());
    }
}
