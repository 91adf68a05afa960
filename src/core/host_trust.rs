//! Host identity verification.
//!
//! The fingerprint string is `"<key-type> <base64 key bytes>"`, the same text
//! operators paste into `settings.trusted_host_key`.

use crate::error::{Error, Result};
use crate::models::trust::HostTrustPolicy;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustDecision {
    Accept,
    Reject(String),
}

impl TrustDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, TrustDecision::Accept)
    }
}

pub fn fingerprint_from_parts(algorithm: &str, key_bytes: &[u8]) -> String {
    format!("{} {}", algorithm, BASE64.encode(key_bytes))
}

/// Fingerprint of a host key presented during the SSH handshake.
pub fn fingerprint(key: &russh::keys::PublicKey) -> Result<String> {
    let bytes = key
        .to_bytes()
        .map_err(|e| Error::Protocol(format!("cannot encode host key: {}", e)))?;
    Ok(fingerprint_from_parts(key.algorithm().as_str(), &bytes))
}

/// Judge an observed host fingerprint against the policy.
pub fn verify(observed: &str, policy: &HostTrustPolicy) -> TrustDecision {
    match policy {
        HostTrustPolicy::TrustOnFirstUse => {
            warn!(
                fingerprint = observed,
                "accepting unverified host key (trust on first use); pin it with settings.trusted_host_key = \"{}\"",
                observed
            );
            TrustDecision::Accept
        }
        HostTrustPolicy::Pinned(expected) => {
            if observed == expected.as_str() {
                debug!(fingerprint = observed, "host key matches pinned fingerprint");
                TrustDecision::Accept
            } else {
                TrustDecision::Reject(format!(
                    "host key mismatch: expected \"{}\", got \"{}\"",
                    expected, observed
                ))
            }
        }
    }
}

/// `verify`, with a rejection turned into `Error::Trust`.
pub fn require_trusted(observed: &str, policy: &HostTrustPolicy) -> Result<()> {
    match verify(observed, policy) {
        TrustDecision::Accept => Ok(()),
        TrustDecision::Reject(reason) => Err(Error::Trust(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F1: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";
    const F2: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIB7bjR3Ajb4WWd6cGGnDIUY3g7EQhVXnFk4VTCPEgB5D";

    #[test]
    fn test_pinned_accepts_exact_match() {
        let policy = HostTrustPolicy::Pinned(F1.into());
        assert_eq!(verify(F1, &policy), TrustDecision::Accept);
    }

    #[test]
    fn test_pinned_rejects_other_key_naming_both() {
        let policy = HostTrustPolicy::Pinned(F1.into());
        match verify(F2, &policy) {
            TrustDecision::Reject(reason) => {
                assert!(reason.contains(F1));
                assert!(reason.contains(F2));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(matches!(require_trusted(F2, &policy), Err(Error::Trust(_))));
    }

    #[test]
    fn test_pinned_no_fuzzy_matching() {
        let policy = HostTrustPolicy::Pinned(F1.into());
        assert!(!verify(&format!("{} ", F1), &policy).is_accept());
        assert!(!verify(&F1[..F1.len() - 1], &policy).is_accept());
    }

    #[test]
    fn test_tofu_accepts_anything() {
        assert!(verify(F1, &HostTrustPolicy::TrustOnFirstUse).is_accept());
        assert!(verify(F2, &HostTrustPolicy::TrustOnFirstUse).is_accept());
    }

    #[test]
    fn test_fingerprint_format() {
        assert_eq!(fingerprint_from_parts("ssh-rsa", b"\x00\x01"), "ssh-rsa AAE=");
    }
}
