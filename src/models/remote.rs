//! Remote endpoint and credential types.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// A reachable SSH endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Exactly one way of proving identity to the remote.
#[derive(Clone)]
pub enum RemoteCredential {
    Password(Zeroizing<String>),
    PrivateKey(PathBuf),
}

impl RemoteCredential {
    /// Pick the credential to use. A private key wins over a password.
    pub fn resolve(
        password: Option<Zeroizing<String>>,
        private_key: Option<PathBuf>,
    ) -> Result<Self> {
        if let Some(path) = private_key {
            return Ok(RemoteCredential::PrivateKey(path));
        }
        match password {
            Some(p) if !p.is_empty() => Ok(RemoteCredential::Password(p)),
            _ => Err(Error::Auth("no password or key provided".into())),
        }
    }

    pub fn private_key_path(&self) -> Option<&Path> {
        match self {
            RemoteCredential::PrivateKey(path) => Some(path),
            RemoteCredential::Password(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RemoteCredential::Password(_) => "password",
            RemoteCredential::PrivateKey(_) => "publickey",
        }
    }
}

impl fmt::Debug for RemoteCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCredential::Password(_) => f.write_str("Password(<redacted>)"),
            RemoteCredential::PrivateKey(path) => {
                f.debug_tuple("PrivateKey").field(path).finish()
            }
        }
    }
}

/// Remote account name plus the credential that authenticates it.
#[derive(Debug, Clone)]
pub struct AuthMethods {
    pub user: String,
    pub credential: RemoteCredential,
}

impl AuthMethods {
    pub fn new(user: impl Into<String>, credential: RemoteCredential) -> Self {
        Self {
            user: user.into(),
            credential,
        }
    }

    pub fn with_key(user: impl Into<String>, private_key: impl Into<PathBuf>) -> Self {
        Self::new(user, RemoteCredential::PrivateKey(private_key.into()))
    }
}

/// Remote account names end up inside shell commands and paths.
pub fn validate_remote_user(user: &str) -> Result<()> {
    if user.is_empty() {
        return Err(Error::Config("remote user cannot be empty".into()));
    }
    if user.starts_with('-') {
        return Err(Error::Config(format!("invalid remote user '{}'", user)));
    }
    if !user
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(Error::Config(format!(
            "invalid remote user '{}': only [a-zA-Z0-9._-] allowed",
            user
        )));
    }
    Ok(())
}
