//! Data structures shared by the core and the CLI.

pub mod config;
pub mod key_pair;
pub mod remote;
pub mod rotation;
pub mod trust;
pub mod tunnel;
