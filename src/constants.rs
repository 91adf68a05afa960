//! Centralized constants for permissions, paths, and limits.

use std::time::Duration;

/// Default root directory holding warden.toml and the audit log.
pub const DEFAULT_WARDEN_ROOT: &str = "/etc/tunnel-warden";

/// Configuration file name inside the root.
pub const CONFIG_FILE_NAME: &str = "warden.toml";

/// RSA modulus size for generated keys.
pub const RSA_KEY_BITS: usize = 4096;

/// Suffix for the candidate key pair written during rotation.
pub const CANDIDATE_SUFFIX: &str = ".new";

/// Permission mode for private key files.
pub const PRIVATE_KEY_MODE: u32 = 0o600;

/// Permission mode for public key files.
pub const PUBLIC_KEY_MODE: u32 = 0o644;

/// Permission mode for a created key directory.
pub const KEY_DIR_MODE: u32 = 0o755;

/// Permission mode for warden.toml and the rotation journal.
pub const CONFIG_FILE_MODE: u32 = 0o600;

/// Permission mode for the audit log.
pub const AUDIT_LOG_MODE: u32 = 0o640;

/// Permission mode for generated unit files and SSH client config.
pub const UNIT_FILE_MODE: u32 = 0o644;

/// Dial timeout for the unauthenticated reachability probe.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on TCP dial, handshake and authentication.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single remote command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Remote account that receives tunnel keys during client setup.
pub const DEFAULT_TUNNEL_USER: &str = "tunneluser";

/// Name of the managed tunnel systemd service.
pub const TUNNEL_SERVICE_NAME: &str = "managed-tunnel";

pub const TUNNEL_SERVICE_DESCRIPTION: &str = "Managed SSH tunnel";

pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

/// Permission mode for a created warden root directory.
pub const WARDEN_ROOT_MODE: u32 = 0o750;
