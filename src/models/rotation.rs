//! Rotation state machine states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a rotation attempt stands. `Promoted` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationState {
    Initial,
    CandidateGenerated,
    CandidateAuthorized,
    OldRevoked,
    Promoted,
    Failed,
}

impl RotationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RotationState::Promoted | RotationState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RotationState::Initial => "initial",
            RotationState::CandidateGenerated => "candidate-generated",
            RotationState::CandidateAuthorized => "candidate-authorized",
            RotationState::OldRevoked => "old-revoked",
            RotationState::Promoted => "promoted",
            RotationState::Failed => "failed",
        }
    }
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RotationState::Promoted.is_terminal());
        assert!(RotationState::Failed.is_terminal());
        assert!(!RotationState::CandidateAuthorized.is_terminal());
    }

    #[test]
    fn test_serde_matches_display() {
        let json = serde_json::to_string(&RotationState::OldRevoked).unwrap();
        assert_eq!(json, "\"old-revoked\"");
        assert_eq!(RotationState::OldRevoked.to_string(), "old-revoked");
    }
}
