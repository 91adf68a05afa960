//! Utility modules for filesystem, privilege and systemd operations.

pub mod fs;
pub mod privilege;
pub mod systemd;
