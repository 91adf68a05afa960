//! Key lifecycle logic: generation, trust, authorization, rotation.

pub mod audit_log;
pub mod authorizer;
pub mod config_store;
pub mod file_lock;
pub mod host_trust;
pub mod key_material;
pub mod paths;
pub mod revoker;
pub mod rotation;
pub mod rotation_journal;
pub mod ssh_config;
pub mod tunnel_unit;
