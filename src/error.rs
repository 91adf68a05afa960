//! Error kinds for key management, remote sessions and rotation.

use crate::models::rotation::RotationState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Key generation or encoding failed.
    #[error("key generation failed: {0}")]
    Crypto(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Host identity rejected, or no trust policy available.
    #[error("host key verification failed: {0}")]
    Trust(String),

    /// No usable credential, or the remote refused it.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("remote command `{command}` failed: {cause}")]
    RemoteExec { command: String, cause: String },

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    #[error("SSH protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("another rotation is already running for {0}")]
    ConcurrentRotation(String),

    #[error("interrupted rotation pending ({}); run `rotate --resume` to finish it", .0.display())]
    PendingRotation(PathBuf),

    #[error("rotation failed in state {state}: {source}")]
    Rotation {
        state: RotationState,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub fn rotation(state: RotationState, source: Error) -> Self {
        Error::Rotation {
            state,
            source: Box::new(source),
        }
    }

    /// The state a failed rotation stopped in, if this is a rotation error.
    pub fn rotation_state(&self) -> Option<RotationState> {
        match self {
            Error::Rotation { state, .. } => Some(*state),
            _ => None,
        }
    }

    /// Innermost error, unwrapping rotation wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Rotation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// `with_context` for `std::io::Result`, producing `Error::Io`.
pub trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::io(f(), source))
    }
}

impl From<russh::Error> for Error {
    fn from(e: russh::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

impl From<russh::keys::Error> for Error {
    fn from(e: russh::keys::Error) -> Self {
        Error::Crypto(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_error_reports_state_and_cause() {
        let err = Error::rotation(
            RotationState::CandidateGenerated,
            Error::Auth("publickey rejected".into()),
        );
        assert_eq!(err.rotation_state(), Some(RotationState::CandidateGenerated));
        assert!(matches!(err.root_cause(), Error::Auth(_)));
        let msg = err.to_string();
        assert!(msg.contains("candidate-generated"), "{}", msg);
        assert!(msg.contains("publickey rejected"), "{}", msg);
    }

    #[test]
    fn test_io_context() {
        let res: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.io_context(|| "read /nope").unwrap_err();
        assert_eq!(err.to_string(), "read /nope: gone");
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout {
            operation: "connect to 203.0.113.5:22".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "connect to 203.0.113.5:22 timed out after 30s");
    }
}
