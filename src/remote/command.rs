//! The closed set of commands the warden runs on a remote host.

use crate::core::key_material;
use crate::error::Result;
use crate::models::remote::validate_remote_user;
use std::fmt;

/// Remote commands, each rendered to one POSIX shell string.
///
/// Keys are matched by their `<algorithm> <base64>` identity, never by the
/// comment, so a re-commented key still counts as the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// No-op round trip proving the session is live.
    Ping,
    /// Append `line` to the user's authorized_keys unless the key is already there.
    AppendKey {
        user: String,
        identity: String,
        line: String,
    },
    /// Delete every authorized_keys line containing `identity`.
    RemoveKey { user: String, identity: String },
    /// Succeed only if `present` is listed and `absent` is not.
    ConfirmKeys {
        user: String,
        present: String,
        absent: String,
    },
}

impl RemoteCommand {
    pub fn append_key(user: &str, public_key_line: &str) -> Result<Self> {
        validate_remote_user(user)?;
        let line = public_key_line.trim();
        Ok(RemoteCommand::AppendKey {
            user: user.to_string(),
            identity: key_material::key_identity(line)?,
            line: line.to_string(),
        })
    }

    pub fn remove_key(user: &str, public_key_line: &str) -> Result<Self> {
        validate_remote_user(user)?;
        Ok(RemoteCommand::RemoveKey {
            user: user.to_string(),
            identity: key_material::key_identity(public_key_line)?,
        })
    }

    pub fn confirm_keys(user: &str, present_line: &str, absent_line: &str) -> Result<Self> {
        validate_remote_user(user)?;
        Ok(RemoteCommand::ConfirmKeys {
            user: user.to_string(),
            present: key_material::key_identity(present_line)?,
            absent: key_material::key_identity(absent_line)?,
        })
    }

    pub fn to_shell(&self) -> String {
        match self {
            RemoteCommand::Ping => "true".to_string(),
            RemoteCommand::AppendKey {
                user,
                identity,
                line,
            } => {
                let file = quote(&authorized_keys_path(user));
                format!(
                    "grep -qF -- {id} {file} 2>/dev/null || printf '%s\\n' {line} >> {file}",
                    id = quote(identity),
                    file = file,
                    line = quote(line),
                )
            }
            RemoteCommand::RemoveKey { user, identity } => {
                // grep -v exits 1 when every line matched; only 2 is an error.
                // Rewriting through cat keeps the file's inode and mode.
                let file = quote(&authorized_keys_path(user));
                format!(
                    "tmp=$(mktemp) && {{ grep -vF -- {id} {file} > \"$tmp\"; [ $? -le 1 ]; }} \
                     && cat \"$tmp\" > {file}; rc=$?; rm -f \"$tmp\"; exit $rc",
                    id = quote(identity),
                    file = file,
                )
            }
            RemoteCommand::ConfirmKeys {
                user,
                present,
                absent,
            } => {
                let file = quote(&authorized_keys_path(user));
                format!(
                    "grep -qF -- {p} {file} && ! grep -qF -- {a} {file}",
                    p = quote(present),
                    a = quote(absent),
                    file = file,
                )
            }
        }
    }

    /// Short label for logs and errors.
    pub fn describe(&self) -> String {
        match self {
            RemoteCommand::Ping => "ping".to_string(),
            RemoteCommand::AppendKey { user, .. } => {
                format!("append key to {}", authorized_keys_path(user))
            }
            RemoteCommand::RemoveKey { user, .. } => {
                format!("remove key from {}", authorized_keys_path(user))
            }
            RemoteCommand::ConfirmKeys { user, .. } => {
                format!("confirm keys in {}", authorized_keys_path(user))
            }
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Accepted-credentials file of a remote account.
pub fn authorized_keys_path(user: &str) -> String {
    if user == "root" {
        "/root/.ssh/authorized_keys".to_string()
    } else {
        format!("/home/{}/.ssh/authorized_keys", user)
    }
}

/// Single-quote for POSIX sh.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQAB alice@client";

    #[test]
    fn test_authorized_keys_path() {
        assert_eq!(authorized_keys_path("root"), "/root/.ssh/authorized_keys");
        assert_eq!(authorized_keys_path("alice"), "/home/alice/.ssh/authorized_keys");
    }

    #[test]
    fn test_quote_escapes_single_quotes() {
        assert_eq!(quote("a'b"), "'a'\\''b'");
        assert_eq!(quote("plain"), "'plain'");
    }

    #[test]
    fn test_append_is_guarded() {
        let cmd = RemoteCommand::append_key("alice", LINE).unwrap();
        assert_eq!(
            cmd.to_shell(),
            "grep -qF -- 'ssh-rsa AAAAB3NzaC1yc2EAAAADAQAB' '/home/alice/.ssh/authorized_keys' 2>/dev/null \
             || printf '%s\\n' 'ssh-rsa AAAAB3NzaC1yc2EAAAADAQAB alice@client' >> '/home/alice/.ssh/authorized_keys'"
        );
    }

    #[test]
    fn test_remove_matches_identity_not_comment() {
        let cmd = RemoteCommand::remove_key("alice", LINE).unwrap();
        let shell = cmd.to_shell();
        assert!(shell.contains("grep -vF -- 'ssh-rsa AAAAB3NzaC1yc2EAAAADAQAB' "));
        assert!(!shell.contains("alice@client"));
    }

    #[test]
    fn test_confirm_keys() {
        let other = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQAC bob";
        let cmd = RemoteCommand::confirm_keys("root", LINE, other).unwrap();
        assert_eq!(
            cmd.to_shell(),
            "grep -qF -- 'ssh-rsa AAAAB3NzaC1yc2EAAAADAQAB' '/root/.ssh/authorized_keys' \
             && ! grep -qF -- 'ssh-rsa AAAAB3NzaC1yc2EAAAADAQAC' '/root/.ssh/authorized_keys'"
        );
    }

    #[test]
    fn test_rejects_bad_user_and_line() {
        assert!(RemoteCommand::append_key("a;rm", LINE).is_err());
        assert!(RemoteCommand::append_key("alice", "garbage").is_err());
    }

    #[test]
    fn test_ping() {
        assert_eq!(RemoteCommand::Ping.to_shell(), "true");
        assert_eq!(RemoteCommand::Ping.describe(), "ping");
    }
}
