//! Adding a public key to a remote account and proving it works.

use crate::core::key_material;
use crate::error::{Error, Result};
use crate::models::key_pair::KeyPair;
use crate::models::remote::{AuthMethods, RemoteTarget};
use crate::models::trust::HostTrustPolicy;
use crate::remote::{self, Connector, RemoteCommand};
use std::path::Path;
use tracing::{error, info};

/// Append `candidate`'s public key to `remote_user`'s authorized_keys using
/// the currently valid credential in `auth`, then open a second session with
/// the candidate private key alone.
///
/// Authorization is complete only once that second session succeeds; any
/// error means the caller must not revoke the old credential.
pub fn authorize<C: Connector>(
    connector: &C,
    candidate: &KeyPair,
    target: &RemoteTarget,
    remote_user: &str,
    auth: &AuthMethods,
    trust: &HostTrustPolicy,
) -> Result<()> {
    let line = key_material::read_public_key(candidate)?;
    let append = RemoteCommand::append_key(remote_user, &line)?;

    info!(%target, user = remote_user, via = auth.credential.kind(), "authorizing candidate key");
    remote::run_once(connector, target, auth, trust, &append)?;

    verify_key(connector, &candidate.private_key_path, target, remote_user, trust).map_err(|e| {
        error!(%target, user = remote_user, error = %e, "candidate key does not authenticate");
        match e {
            Error::Auth(reason) => {
                Error::Auth(format!("candidate key rejected after append: {}", reason))
            }
            other => other,
        }
    })?;
    info!(%target, user = remote_user, "candidate key verified");
    Ok(())
}

/// Open a fresh session with `private_key` alone and make a no-op round trip.
pub fn verify_key<C: Connector>(
    connector: &C,
    private_key: &Path,
    target: &RemoteTarget,
    remote_user: &str,
    trust: &HostTrustPolicy,
) -> Result<()> {
    let auth = AuthMethods::with_key(remote_user, private_key);
    remote::run_once(connector, target, &auth, trust, &RemoteCommand::Ping)?;
    Ok(())
}
