//! In-memory remote host for exercising the key lifecycle without a network.
//!
//! Keeps one authorized_keys file per account, authenticates private keys by
//! deriving their public key, checks host trust with the real verifier and
//! records every session and mutation.

use crate::core::{host_trust, key_material};
use crate::error::{Error, Result};
use crate::models::remote::{AuthMethods, RemoteCredential, RemoteTarget};
use crate::models::trust::HostTrustPolicy;
use crate::remote::{Connector, RemoteCommand, RemoteSession};
use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

pub const HOST_FINGERPRINT: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIPakeHostKeyForTestsOnlyxxxxxxxxxxxxxxxxxx";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    /// Session authenticated as `user`, with the key identity if a key was used.
    Opened {
        user: String,
        key: Option<String>,
    },
    Refused {
        user: String,
        reason: String,
    },
    Ran {
        key: Option<String>,
        command: RemoteCommand,
    },
    Closed,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub host_fingerprint: String,
    pub passwords: HashMap<String, String>,
    pub files: HashMap<String, Vec<String>>,
    pub events: Vec<FakeEvent>,
    /// (account, file contents) after every authorized_keys mutation.
    pub snapshots: Vec<(String, Vec<String>)>,
    pub fail_append: bool,
    /// Report success for appends without writing anything.
    pub ignore_append: bool,
    pub fail_remove: bool,
    /// Apply the removal, then report failure (connection lost after exec).
    pub remove_then_fail: bool,
    pub fail_confirm: bool,
    pub unreachable: bool,
}

#[derive(Clone)]
pub struct FakeRemote {
    state: Rc<RefCell<FakeState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        let state = FakeState {
            host_fingerprint: HOST_FINGERPRINT.to_string(),
            ..Default::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn state(&self) -> RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }

    pub fn set_password(&self, user: &str, password: &str) {
        self.state()
            .passwords
            .insert(user.to_string(), password.to_string());
    }

    /// Seed an authorized_keys line without recording a snapshot.
    pub fn authorize_line(&self, user: &str, line: &str) {
        self.state()
            .files
            .entry(user.to_string())
            .or_default()
            .push(line.trim().to_string());
    }

    pub fn lines(&self, user: &str) -> Vec<String> {
        self.state.borrow().files.get(user).cloned().unwrap_or_default()
    }

    pub fn is_authorized(&self, user: &str, public_key_line: &str) -> bool {
        let identity = match key_material::key_identity(public_key_line) {
            Ok(identity) => identity,
            Err(_) => return false,
        };
        self.lines(user).iter().any(|l| l.contains(&identity))
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.state.borrow().events.clone()
    }

    pub fn snapshots(&self) -> Vec<(String, Vec<String>)> {
        self.state.borrow().snapshots.clone()
    }
}

/// Identity (`ssh-rsa <base64>`) of a PEM private key file.
pub fn identity_of_private_key(path: &Path) -> Result<String> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| Error::io(format!("read {}", path.display()), e))?;
    let key = russh::keys::decode_secret_key(&pem, None).map_err(|e| Error::Auth(e.to_string()))?;
    let line = key
        .public_key()
        .to_openssh()
        .map_err(|e| Error::Crypto(e.to_string()))?;
    key_material::key_identity(&line)
}

impl Connector for FakeRemote {
    type Session = FakeSession;

    fn open(
        &self,
        target: &RemoteTarget,
        auth: &AuthMethods,
        trust: &HostTrustPolicy,
    ) -> Result<FakeSession> {
        let mut state = self.state();
        if state.unreachable {
            return Err(Error::io(
                format!("connect to {}", target),
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
            ));
        }
        host_trust::require_trusted(&state.host_fingerprint, trust)?;

        let key = match &auth.credential {
            RemoteCredential::PrivateKey(path) => {
                let identity = identity_of_private_key(path)?;
                let known = state
                    .files
                    .get(&auth.user)
                    .is_some_and(|lines| lines.iter().any(|l| l.contains(&identity)));
                if !known {
                    state.events.push(FakeEvent::Refused {
                        user: auth.user.clone(),
                        reason: "publickey".into(),
                    });
                    return Err(Error::Auth(format!(
                        "publickey authentication rejected for user {}",
                        auth.user
                    )));
                }
                Some(identity)
            }
            RemoteCredential::Password(password) => {
                if state.passwords.get(&auth.user).map(String::as_str) != Some(password.as_str()) {
                    state.events.push(FakeEvent::Refused {
                        user: auth.user.clone(),
                        reason: "password".into(),
                    });
                    return Err(Error::Auth(format!(
                        "password authentication rejected for user {}",
                        auth.user
                    )));
                }
                None
            }
        };

        state.events.push(FakeEvent::Opened {
            user: auth.user.clone(),
            key: key.clone(),
        });
        Ok(FakeSession {
            state: Rc::clone(&self.state),
            key,
            open: true,
        })
    }
}

pub struct FakeSession {
    state: Rc<RefCell<FakeState>>,
    key: Option<String>,
    open: bool,
}

impl FakeSession {
    fn failure(command: &RemoteCommand, cause: &str) -> Error {
        Error::RemoteExec {
            command: command.describe(),
            cause: cause.to_string(),
        }
    }
}

impl RemoteSession for FakeSession {
    fn run(&mut self, command: &RemoteCommand) -> Result<String> {
        if !self.open {
            return Err(Self::failure(command, "session is closed"));
        }
        let mut state = self.state.borrow_mut();
        state.events.push(FakeEvent::Ran {
            key: self.key.clone(),
            command: command.clone(),
        });

        match command {
            RemoteCommand::Ping => Ok(String::new()),
            RemoteCommand::AppendKey {
                user,
                identity,
                line,
            } => {
                if state.fail_append {
                    return Err(Self::failure(command, "exit status 1: Permission denied"));
                }
                if state.ignore_append {
                    return Ok(String::new());
                }
                let file = state.files.entry(user.clone()).or_default();
                if !file.iter().any(|l| l.contains(identity.as_str())) {
                    file.push(line.clone());
                }
                let snapshot = file.clone();
                state.snapshots.push((user.clone(), snapshot));
                Ok(String::new())
            }
            RemoteCommand::RemoveKey { user, identity } => {
                if state.fail_remove {
                    return Err(Self::failure(command, "exit status 2"));
                }
                let file = state.files.entry(user.clone()).or_default();
                file.retain(|l| !l.contains(identity.as_str()));
                let snapshot = file.clone();
                state.snapshots.push((user.clone(), snapshot));
                if state.remove_then_fail {
                    return Err(Self::failure(command, "connection reset by peer"));
                }
                Ok(String::new())
            }
            RemoteCommand::ConfirmKeys {
                user,
                present,
                absent,
            } => {
                let lines = state.files.get(user).cloned().unwrap_or_default();
                let ok = lines.iter().any(|l| l.contains(present.as_str()))
                    && !lines.iter().any(|l| l.contains(absent.as_str()));
                if state.fail_confirm || !ok {
                    return Err(Self::failure(command, "exit status 1"));
                }
                Ok(String::new())
            }
        }
    }

    fn close(mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl FakeSession {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            if let Ok(mut state) = self.state.try_borrow_mut() {
                state.events.push(FakeEvent::Closed);
            }
        }
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.release();
    }
}
