//! Host identity trust policy.

use crate::error::{Error, Result};

/// How a remote host's identity key is judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostTrustPolicy {
    /// Accept any host key and log it. Insecure; must be asked for explicitly.
    TrustOnFirstUse,
    /// Accept only this exact `"<key-type> <base64>"` fingerprint.
    Pinned(String),
}

impl HostTrustPolicy {
    /// Build the policy from settings. A pinned key always wins; without one,
    /// trust-on-first-use must be opted into.
    pub fn from_settings(trusted_host_key: Option<&str>, trust_on_first_use: bool) -> Result<Self> {
        match trusted_host_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Ok(HostTrustPolicy::Pinned(key.to_string())),
            None if trust_on_first_use => Ok(HostTrustPolicy::TrustOnFirstUse),
            None => Err(Error::Trust(
                "no trusted host key configured; set settings.trusted_host_key (see `trust scan`) \
                 or pass --trust-on-first-use to accept any host key"
                    .into(),
            )),
        }
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self, HostTrustPolicy::Pinned(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_wins_over_tofu() {
        let policy = HostTrustPolicy::from_settings(Some("ssh-ed25519 AAAA"), true).unwrap();
        assert_eq!(policy, HostTrustPolicy::Pinned("ssh-ed25519 AAAA".into()));
    }

    #[test]
    fn test_tofu_requires_opt_in() {
        assert!(matches!(
            HostTrustPolicy::from_settings(None, false),
            Err(Error::Trust(_))
        ));
        assert_eq!(
            HostTrustPolicy::from_settings(Some("  "), true).unwrap(),
            HostTrustPolicy::TrustOnFirstUse
        );
    }
}
