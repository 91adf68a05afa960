//! Removing a public key from a remote account.

use crate::core::key_material;
use crate::error::{Error, IoContext, Result};
use crate::models::remote::{AuthMethods, RemoteCredential, RemoteTarget};
use crate::models::trust::HostTrustPolicy;
use crate::remote::{Connector, RemoteCommand, RemoteSession};
use std::path::{Path, PathBuf};
use tracing::info;

/// Delete `remove_line`'s key from `remote_user`'s authorized_keys.
///
/// `auth` must be a private key other than the one being removed; its public
/// half is read from the `<private>.pub` file next to it. After the delete the
/// same session confirms the authenticating key is still listed and the old
/// one is gone, then a fresh session proves the remaining key still works.
pub fn revoke<C: Connector>(
    connector: &C,
    remove_line: &str,
    target: &RemoteTarget,
    remote_user: &str,
    auth: &AuthMethods,
    trust: &HostTrustPolicy,
) -> Result<()> {
    let private_key = match &auth.credential {
        RemoteCredential::PrivateKey(path) => path.clone(),
        RemoteCredential::Password(_) => {
            return Err(Error::Auth(
                "revocation must authenticate with the replacement key, not a password".into(),
            ))
        }
    };
    let keep_line = sidecar_public_key(&private_key)?;
    if key_material::key_identity(&keep_line)? == key_material::key_identity(remove_line)? {
        return Err(Error::Auth(
            "refusing to revoke the key this session authenticates with".into(),
        ));
    }

    let remove = RemoteCommand::remove_key(remote_user, remove_line)?;
    let confirm = RemoteCommand::confirm_keys(remote_user, &keep_line, remove_line)?;

    info!(%target, user = remote_user, "revoking old key");
    let mut session = connector.open(target, auth, trust)?;
    session.run(&remove)?;
    session.run(&confirm)?;
    session.close()?;

    let recheck = AuthMethods::with_key(auth.user.clone(), private_key);
    crate::remote::run_once(connector, target, &recheck, trust, &RemoteCommand::Ping)?;
    info!(%target, user = remote_user, "old key revoked");
    Ok(())
}

fn sidecar_public_key(private_key: &Path) -> Result<String> {
    let mut path = PathBuf::from(private_key);
    path.as_mut_os_string().push(".pub");
    let content = std::fs::read_to_string(&path)
        .io_context(|| format!("read public key {}", path.display()))?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::key_material::KeyMaterial;
    use crate::models::key_pair::KeyPair;
    use crate::remote::fake::{FakeEvent, FakeRemote, HOST_FINGERPRINT};
    use tempfile::TempDir;

    struct Setup {
        _dir: TempDir,
        remote: FakeRemote,
        old: KeyPair,
        new: KeyPair,
    }

    fn setup() -> Setup {
        let dir = TempDir::new().unwrap();
        let keys = KeyMaterial::with_bits(1024);
        let old = keys.generate(dir.path(), "id_old", "alice@client").unwrap();
        let new = keys.generate(dir.path(), "id_old.new", "alice@client").unwrap();
        let remote = FakeRemote::new();
        remote.authorize_line("alice", "ssh-rsa AAAAB3NzaC1yc2EAAAADAQAB unrelated");
        remote.authorize_line("alice", &key_material::read_public_key(&old).unwrap());
        remote.authorize_line("alice", &key_material::read_public_key(&new).unwrap());
        Setup {
            _dir: dir,
            remote,
            old,
            new,
        }
    }

    fn pinned() -> HostTrustPolicy {
        HostTrustPolicy::Pinned(HOST_FINGERPRINT.into())
    }

    #[test]
    fn test_revoke_removes_only_the_old_key() {
        let s = setup();
        let old_line = key_material::read_public_key(&s.old).unwrap();
        let new_line = key_material::read_public_key(&s.new).unwrap();
        let auth = AuthMethods::with_key("alice", &s.new.private_key_path);

        let target = RemoteTarget::new("h", 22);
        revoke(&s.remote, &old_line, &target, "alice", &auth, &pinned()).unwrap();

        assert!(!s.remote.is_authorized("alice", &old_line));
        assert!(s.remote.is_authorized("alice", &new_line));
        assert_eq!(s.remote.lines("alice").len(), 2);
        // recheck session after the delete
        let opened = s
            .remote
            .events()
            .iter()
            .filter(|e| matches!(e, FakeEvent::Opened { .. }))
            .count();
        assert_eq!(opened, 2);
    }

    #[test]
    fn test_refuses_self_revocation() {
        let s = setup();
        let old_line = key_material::read_public_key(&s.old).unwrap();
        let auth = AuthMethods::with_key("alice", &s.old.private_key_path);
        let target = RemoteTarget::new("h", 22);
        let err = revoke(&s.remote, &old_line, &target, "alice", &auth, &pinned()).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(s.remote.events().is_empty());
        assert!(s.remote.is_authorized("alice", &old_line));
    }

    #[test]
    fn test_remove_failure_is_remote_exec_error() {
        let s = setup();
        s.remote.state().fail_remove = true;
        let old_line = key_material::read_public_key(&s.old).unwrap();
        let auth = AuthMethods::with_key("alice", &s.new.private_key_path);
        let target = RemoteTarget::new("h", 22);
        let err = revoke(&s.remote, &old_line, &target, "alice", &auth, &pinned()).unwrap_err();
        assert!(matches!(err, Error::RemoteExec { .. }));
        assert!(s.remote.is_authorized("alice", &old_line));
    }

    #[test]
    fn test_session_released_after_failed_remove() {
        let s = setup();
        s.remote.state().fail_remove = true;
        let old_line = key_material::read_public_key(&s.old).unwrap();
        let auth = AuthMethods::with_key("alice", &s.new.private_key_path);
        let target = RemoteTarget::new("h", 22);
        revoke(&s.remote, &old_line, &target, "alice", &auth, &pinned()).unwrap_err();

        let events = s.remote.events();
        let failed_at = events
            .iter()
            .position(|e| {
                matches!(
                    e,
                    FakeEvent::Ran {
                        command: RemoteCommand::RemoveKey { .. },
                        ..
                    }
                )
            })
            .unwrap();
        assert_eq!(events.get(failed_at + 1), Some(&FakeEvent::Closed));
        assert_eq!(events.len(), failed_at + 2);
    }
}
