//! Key rotation protocol.
//!
//! ```text
//! Initial -> CandidateGenerated -> CandidateAuthorized -> OldRevoked -> Promoted
//!      \              \                    \                   \
//!       `--------------`--------------------`-------------------`--> Failed
//! ```
//!
//! The remote accepts the old key, the new key, or both at every step; it
//! never accepts neither. The old key is revoked only after the candidate has
//! authenticated on its own, and only through a session opened with it.

use crate::core::config_store::ConfigStore;
use crate::core::file_lock::RotationLock;
use crate::core::key_material::{self, KeyMaterial};
use crate::core::rotation_journal::RotationJournal;
use crate::core::{authorizer, revoker};
use crate::error::{Error, Result};
use crate::models::config::RotateSection;
use crate::models::key_pair::{candidate_name, validate_key_name, KeyPair};
use crate::models::remote::{validate_remote_user, AuthMethods, RemoteTarget};
use crate::models::rotation::RotationState;
use crate::models::trust::HostTrustPolicy;
use crate::remote::Connector;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// What to rotate and where it is authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationRequest {
    pub key_directory: PathBuf,
    pub key_name: String,
    pub key_comment: String,
    pub target: RemoteTarget,
    pub remote_user: String,
}

impl RotationRequest {
    pub fn from_section(section: &RotateSection) -> Result<Self> {
        section.require()?;
        let request = Self {
            key_directory: section.key_directory.clone().unwrap_or_default(),
            key_name: section.key_name.clone().unwrap_or_default(),
            key_comment: section.key_comment.clone().unwrap_or_default(),
            target: RemoteTarget::new(
                section.server_name.clone().unwrap_or_default(),
                section.server_port.unwrap_or_default(),
            ),
            remote_user: section.server_user.clone().unwrap_or_default(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        validate_key_name(&self.key_name)
            .map_err(|e| Error::Config(format!("invalid key name '{}': {}", self.key_name, e)))?;
        validate_remote_user(&self.remote_user)
    }

    /// The `[rotate]` baseline describing this key after a rotation.
    pub fn to_section(&self) -> RotateSection {
        RotateSection {
            key_name: Some(self.key_name.clone()),
            key_directory: Some(self.key_directory.clone()),
            key_comment: Some(self.key_comment.clone()),
            server_name: Some(self.target.host.clone()),
            server_port: Some(self.target.port),
            server_user: Some(self.remote_user.clone()),
        }
    }

    pub fn canonical(&self) -> KeyPair {
        KeyPair::locate(&self.key_directory, &self.key_name, &self.key_comment)
    }

    pub fn candidate(&self) -> KeyPair {
        KeyPair::candidate_for(&self.key_directory, &self.key_name, &self.key_comment)
    }

    pub fn journal_path(&self) -> PathBuf {
        RotationJournal::path_for(&self.key_directory, &self.key_name)
    }
}

#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub state: RotationState,
    pub key: KeyPair,
    /// Public key line now active.
    pub public_key: String,
    /// False if the rotation succeeded but the new baseline could not be saved.
    pub baseline_persisted: bool,
    pub resumed: bool,
}

/// Where the post-rotation baseline is saved.
pub trait BaselineStore {
    fn store_baseline(&self, section: &RotateSection) -> Result<()>;
}

impl BaselineStore for ConfigStore {
    fn store_baseline(&self, section: &RotateSection) -> Result<()> {
        self.store_rotation(section)
    }
}

pub struct RotationOrchestrator<'a, C: Connector> {
    connector: &'a C,
    keys: KeyMaterial,
    trust: HostTrustPolicy,
    baseline: Option<&'a dyn BaselineStore>,
}

impl<'a, C: Connector> RotationOrchestrator<'a, C> {
    pub fn new(connector: &'a C, trust: HostTrustPolicy) -> Self {
        Self {
            connector,
            keys: KeyMaterial::new(),
            trust,
            baseline: None,
        }
    }

    pub fn with_key_material(mut self, keys: KeyMaterial) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_baseline_store(mut self, store: &'a dyn BaselineStore) -> Self {
        self.baseline = Some(store);
        self
    }

    /// Run one rotation from `Initial` to `Promoted`.
    ///
    /// Failures come back as `Error::Rotation` carrying the last state
    /// reached. Nothing is retried.
    pub fn rotate(&self, request: &RotationRequest) -> Result<RotationOutcome> {
        request.validate()?;
        let _lock = RotationLock::acquire(&request.key_directory, &request.key_name)?;

        let journal_path = request.journal_path();
        if journal_path.exists() {
            return Err(Error::PendingRotation(journal_path));
        }

        let canonical = request.canonical();
        if !canonical.exists() {
            return Err(Error::io(
                format!("key pair {}", canonical.private_key_path.display()),
                io::Error::new(io::ErrorKind::NotFound, "nothing to rotate"),
            ));
        }
        let old_line = key_material::read_public_key(&canonical)?;
        let old_auth = AuthMethods::with_key(&request.remote_user, &canonical.private_key_path);

        // Leftovers of a run that died before authorization finished. The
        // old key was never revoked in that case.
        let leftover = request.candidate();
        if leftover.any_exists() {
            warn!(
                path = %leftover.private_key_path.display(),
                "removing stale candidate key from an interrupted rotation"
            );
            if !key_material::remove_key_pair(&leftover) {
                return Err(fail(
                    RotationState::Initial,
                    Error::io(
                        format!("stale candidate {}", leftover.private_key_path.display()),
                        io::Error::new(io::ErrorKind::AlreadyExists, "cannot remove"),
                    ),
                ));
            }
        }

        let mut state = RotationState::Initial;
        info!(key = %request.key_name, target = %request.target, %state, "starting key rotation");

        // Initial -> CandidateGenerated
        let candidate = self
            .keys
            .generate(
                &request.key_directory,
                &candidate_name(&request.key_name),
                &request.key_comment,
            )
            .map_err(|e| fail(state, e))?;
        state = transition(request, state, RotationState::CandidateGenerated);

        // CandidateGenerated -> CandidateAuthorized
        let authorized = key_material::read_public_key(&candidate).and_then(|line| {
            authorizer::authorize(
                self.connector,
                &candidate,
                &request.target,
                &request.remote_user,
                &old_auth,
                &self.trust,
            )?;
            Ok(line)
        });
        let new_line = match authorized {
            Ok(line) => line,
            Err(e) => {
                key_material::remove_key_pair(&candidate);
                return Err(fail(state, e));
            }
        };
        let mut journal = RotationJournal::begin(
            &request.key_directory,
            &request.key_name,
            &old_line,
            &new_line,
        );
        if let Err(e) = journal.save() {
            key_material::remove_key_pair(&candidate);
            return Err(fail(state, e));
        }
        state = transition(request, state, RotationState::CandidateAuthorized);

        // CandidateAuthorized -> OldRevoked
        let new_auth = AuthMethods::with_key(&request.remote_user, &candidate.private_key_path);
        if let Err(e) = revoker::revoke(
            self.connector,
            &old_line,
            &request.target,
            &request.remote_user,
            &new_auth,
            &self.trust,
        ) {
            self.after_failed_revoke(request, &canonical, &candidate, &journal);
            return Err(fail(state, e));
        }
        if let Err(e) = journal.advance(RotationState::OldRevoked) {
            warn!(error = %e, "cannot update rotation journal");
        }
        state = transition(request, state, RotationState::OldRevoked);

        // OldRevoked -> Promoted
        promote(&candidate, &canonical).map_err(|e| fail(state, e))?;
        Ok(self.finish(request, &journal, canonical, new_line, false))
    }

    /// Finish a rotation interrupted after the candidate was authorized.
    pub fn resume(&self, request: &RotationRequest) -> Result<RotationOutcome> {
        request.validate()?;
        let _lock = RotationLock::acquire(&request.key_directory, &request.key_name)?;

        let journal_path = request.journal_path();
        let mut journal = RotationJournal::load(&journal_path)?.ok_or_else(|| {
            Error::Config(format!(
                "no interrupted rotation to resume ({} not found)",
                journal_path.display()
            ))
        })?;
        let canonical = request.canonical();
        let candidate = request.candidate();
        let mut state = journal.state;
        info!(key = %request.key_name, %state, "resuming key rotation");

        match state {
            RotationState::CandidateAuthorized => {
                if !candidate.exists() {
                    return Err(fail(
                        state,
                        Error::io(
                            format!("candidate key {}", candidate.private_key_path.display()),
                            io::Error::new(io::ErrorKind::NotFound, "missing"),
                        ),
                    ));
                }
                authorizer::verify_key(
                    self.connector,
                    &candidate.private_key_path,
                    &request.target,
                    &request.remote_user,
                    &self.trust,
                )
                .map_err(|e| fail(state, e))?;
                let new_auth =
                    AuthMethods::with_key(&request.remote_user, &candidate.private_key_path);
                revoker::revoke(
                    self.connector,
                    &journal.old_key,
                    &request.target,
                    &request.remote_user,
                    &new_auth,
                    &self.trust,
                )
                .map_err(|e| fail(state, e))?;
                if let Err(e) = journal.advance(RotationState::OldRevoked) {
                    warn!(error = %e, "cannot update rotation journal");
                }
                state = transition(request, state, RotationState::OldRevoked);
            }
            RotationState::OldRevoked => {}
            other => {
                return Err(Error::Config(format!(
                    "rotation journal {} is in unexpected state {}",
                    journal_path.display(),
                    other
                )))
            }
        }

        promote(&candidate, &canonical).map_err(|e| fail(state, e))?;
        let active = key_material::read_public_key(&canonical).map_err(|e| fail(state, e))?;
        let expected = key_material::key_identity(&journal.candidate_key)?;
        if key_material::key_identity(&active)? != expected {
            return Err(fail(
                state,
                Error::Crypto(format!(
                    "{} does not hold the rotated key; manual recovery required",
                    canonical.public_key_path.display()
                )),
            ));
        }
        let new_line = journal.candidate_key.clone();
        Ok(self.finish(request, &journal, canonical, new_line, true))
    }

    /// Revocation failed. Drop the candidate only if the old key still gets
    /// in; otherwise it is the one working credential and must be kept.
    fn after_failed_revoke(
        &self,
        request: &RotationRequest,
        canonical: &KeyPair,
        candidate: &KeyPair,
        journal: &RotationJournal,
    ) {
        match authorizer::verify_key(
            self.connector,
            &canonical.private_key_path,
            &request.target,
            &request.remote_user,
            &self.trust,
        ) {
            Ok(()) => {
                key_material::remove_key_pair(candidate);
                if let Err(e) = journal.remove() {
                    error!(
                        path = %journal.path().display(),
                        error = %e,
                        "cannot remove rotation journal, please remove manually"
                    );
                }
            }
            Err(probe) => {
                error!(
                    candidate = %candidate.private_key_path.display(),
                    error = %probe,
                    "old key no longer authenticates; keeping candidate key, run `rotate --resume`"
                );
            }
        }
    }

    fn finish(
        &self,
        request: &RotationRequest,
        journal: &RotationJournal,
        canonical: KeyPair,
        public_key: String,
        resumed: bool,
    ) -> RotationOutcome {
        if let Err(e) = journal.remove() {
            error!(
                path = %journal.path().display(),
                error = %e,
                "cannot remove rotation journal, please remove manually"
            );
        }
        info!(key = %request.key_name, state = %RotationState::Promoted, "key rotation complete");

        let baseline_persisted = match self.baseline {
            Some(store) => match store.store_baseline(&request.to_section()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "rotation succeeded but the new baseline was not saved");
                    false
                }
            },
            None => false,
        };

        RotationOutcome {
            state: RotationState::Promoted,
            key: canonical,
            public_key,
            baseline_persisted,
            resumed,
        }
    }
}

fn transition(request: &RotationRequest, from: RotationState, to: RotationState) -> RotationState {
    info!(key = %request.key_name, %from, %to, "rotation state");
    to
}

fn fail(state: RotationState, source: Error) -> Error {
    error!(%state, error = %source, "key rotation failed");
    Error::rotation(state, source)
}

/// Rename the candidate files over the canonical ones, private key first.
/// A file already moved by an earlier, interrupted attempt is skipped.
fn promote(candidate: &KeyPair, canonical: &KeyPair) -> Result<()> {
    for (from, to) in [
        (&candidate.private_key_path, &canonical.private_key_path),
        (&candidate.public_key_path, &canonical.public_key_path),
    ] {
        if !from.exists() {
            continue;
        }
        fs::rename(from, to)
            .map_err(|e| Error::io(format!("rename {} to {}", from.display(), to.display()), e))?;
    }
    Ok(())
}
