//! Reverse tunnel endpoint description.

/// Where a managed tunnel connects and what it forwards. Read by the SSH
/// config writer and the unit renderer; the rotation core never touches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelEndpoint {
    pub remote_host: String,
    pub remote_port: u16,
    pub remote_user: String,
    pub local_host: String,
    pub local_port: u16,
}
