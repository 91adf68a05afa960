//! Authenticated, host-verified remote command execution.
//!
//! `Connector` opens sessions; `RemoteSession` runs one command at a time.
//! The russh transport lives in `ssh`, the in-memory remote used by tests in
//! `fake`.

pub mod command;
pub mod discovery;
pub mod ssh;

#[cfg(test)]
pub mod fake;

use crate::constants;
use crate::error::Result;
use crate::models::remote::{AuthMethods, RemoteTarget};
use crate::models::trust::HostTrustPolicy;
use std::time::Duration;

pub use command::RemoteCommand;

/// Bounds on session establishment and command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// TCP dial, handshake and authentication.
    pub connect: Duration,
    /// One remote command, start to exit status.
    pub command: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect: constants::DEFAULT_CONNECT_TIMEOUT,
            command: constants::DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

pub trait Connector {
    type Session: RemoteSession;

    /// Dial, verify the host identity against `trust`, then authenticate.
    /// Host verification happens before any credential is offered.
    fn open(
        &self,
        target: &RemoteTarget,
        auth: &AuthMethods,
        trust: &HostTrustPolicy,
    ) -> Result<Self::Session>;
}

/// An open session. Dropping it releases the connection on every path.
pub trait RemoteSession {
    /// Run one command to completion and return its stdout.
    fn run(&mut self, command: &RemoteCommand) -> Result<String>;

    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Open a session, run one command, close.
pub fn run_once<C: Connector>(
    connector: &C,
    target: &RemoteTarget,
    auth: &AuthMethods,
    trust: &HostTrustPolicy,
    command: &RemoteCommand,
) -> Result<String> {
    let mut session = connector.open(target, auth, trust)?;
    let output = session.run(command)?;
    session.close()?;
    Ok(output)
}
