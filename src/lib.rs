//! SSH key provisioning and zero-downtime rotation for reverse tunnels.
//!
//! Generates RSA key pairs, installs them in a remote account's
//! authorized_keys, rotates them without ever leaving the remote with no
//! working key, and renders the SSH client config and systemd unit that keep
//! a reverse tunnel up.
//!
//! ## Modules
//! - `cli`: Command-line handlers
//! - `core`: Key material, authorization, revocation, rotation, audit
//! - `remote`: SSH transport and the commands run over it
//! - `models`: Data structures
//! - `util`: System utilities (fs, privilege, systemd)

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod remote;
pub mod util;
