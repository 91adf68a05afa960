//! russh transport behind `Connector`.
//!
//! The rest of the warden is synchronous, so the connector owns a
//! current-thread tokio runtime and blocks on it. Every dial, handshake,
//! authentication and command is bounded by `SessionTimeouts`.

use crate::core::host_trust;
use crate::error::{Error, IoContext, Result};
use crate::models::remote::{AuthMethods, RemoteCredential, RemoteTarget};
use crate::models::trust::HostTrustPolicy;
use crate::remote::{Connector, RemoteCommand, RemoteSession, SessionTimeouts};
use russh::client::{self, AuthResult, Handle};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Checks the server key during the handshake, before any credential is sent.
/// Without a policy it only records the key (used by host key scans).
struct TrustHandler {
    policy: Option<HostTrustPolicy>,
    observed: Arc<Mutex<Option<String>>>,
}

impl TrustHandler {
    fn new(policy: Option<HostTrustPolicy>) -> Self {
        Self {
            policy,
            observed: Arc::new(Mutex::new(None)),
        }
    }

    fn judge(&self, key: &PublicKey) -> Result<bool> {
        let fingerprint = host_trust::fingerprint(key)?;
        if let Ok(mut slot) = self.observed.lock() {
            *slot = Some(fingerprint.clone());
        }
        match &self.policy {
            Some(policy) => {
                host_trust::require_trusted(&fingerprint, policy)?;
                Ok(true)
            }
            None => Ok(true),
        }
    }
}

impl client::Handler for TrustHandler {
    type Error = Error;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = std::result::Result<bool, Self::Error>> + Send {
        let decision = self.judge(server_public_key);
        async move { decision }
    }
}

pub struct SshConnector {
    runtime: Arc<Runtime>,
    timeouts: SessionTimeouts,
}

impl SshConnector {
    pub fn new(timeouts: SessionTimeouts) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .io_context(|| "start SSH runtime")?;
        Ok(Self {
            runtime: Arc::new(runtime),
            timeouts,
        })
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        self.timeouts
    }

    /// Handshake without authenticating and return the host key fingerprint.
    pub fn scan_host_key(&self, target: &RemoteTarget) -> Result<String> {
        let after = self.timeouts.connect;
        let (handle, observed) = self
            .runtime
            .block_on(async { timeout(after, handshake(target, None)).await })
            .map_err(|_| Error::Timeout {
                operation: format!("host key scan of {}", target),
                after,
            })??;
        let _ = self
            .runtime
            .block_on(handle.disconnect(Disconnect::ByApplication, "", "en"));
        let fingerprint = observed
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or_else(|| Error::Protocol(format!("{} presented no host key", target)))?;
        Ok(fingerprint)
    }
}

impl Connector for SshConnector {
    type Session = SshSession;

    fn open(
        &self,
        target: &RemoteTarget,
        auth: &AuthMethods,
        trust: &HostTrustPolicy,
    ) -> Result<SshSession> {
        let after = self.timeouts.connect;
        debug!(%target, user = %auth.user, method = auth.credential.kind(), "opening SSH session");
        let handle = self
            .runtime
            .block_on(async {
                timeout(after, async {
                    let (mut handle, _) = handshake(target, Some(trust.clone())).await?;
                    authenticate(&mut handle, auth).await?;
                    Ok::<_, Error>(handle)
                })
                .await
            })
            .map_err(|_| Error::Timeout {
                operation: format!("connect to {}", target),
                after,
            })??;
        info!(%target, user = %auth.user, "SSH session established");
        Ok(SshSession {
            runtime: Arc::clone(&self.runtime),
            handle: Some(handle),
            command_timeout: self.timeouts.command,
            target: target.to_string(),
        })
    }
}

async fn handshake(
    target: &RemoteTarget,
    policy: Option<HostTrustPolicy>,
) -> Result<(Handle<TrustHandler>, Arc<Mutex<Option<String>>>)> {
    let address = target.address();
    let stream = TcpStream::connect(address.as_str())
        .await
        .io_context(|| format!("connect to {}", address))?;
    let handler = TrustHandler::new(policy);
    let observed = Arc::clone(&handler.observed);
    let config = Arc::new(client::Config::default());
    let handle = client::connect_stream(config, stream, handler).await?;
    Ok((handle, observed))
}

/// A private key is used when configured; otherwise the password.
async fn authenticate(handle: &mut Handle<TrustHandler>, auth: &AuthMethods) -> Result<()> {
    let result = match &auth.credential {
        RemoteCredential::PrivateKey(path) => {
            let pem = std::fs::read_to_string(path)
                .io_context(|| format!("read private key {}", path.display()))?;
            let key = russh::keys::decode_secret_key(&pem, None).map_err(|e| {
                Error::Auth(format!("cannot load private key {}: {}", path.display(), e))
            })?;
            let hash = handle.best_supported_rsa_hash().await?.flatten();
            handle
                .authenticate_publickey(
                    auth.user.as_str(),
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash),
                )
                .await?
        }
        RemoteCredential::Password(password) => {
            handle
                .authenticate_password(auth.user.as_str(), password.as_str())
                .await?
        }
    };

    match result {
        AuthResult::Success => Ok(()),
        AuthResult::Failure {
            remaining_methods, ..
        } => Err(Error::Auth(format!(
            "{} authentication rejected for user {} (server offers {:?})",
            auth.credential.kind(),
            auth.user,
            remaining_methods
        ))),
    }
}

#[derive(Debug, Default)]
struct ExecOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_status: Option<u32>,
}

async fn exec(
    handle: &Handle<TrustHandler>,
    command: &str,
) -> std::result::Result<ExecOutput, russh::Error> {
    let mut channel = handle.channel_open_session().await?;
    channel.exec(true, command).await?;
    let mut output = ExecOutput::default();
    // exit-status may arrive after EOF, so read until the channel closes.
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext: 1 } => output.stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
            ChannelMsg::Close => break,
            _ => {}
        }
    }
    Ok(output)
}

/// Open SSH session. The connection is released on close, or on drop if the
/// holder bails out early.
pub struct SshSession {
    runtime: Arc<Runtime>,
    handle: Option<Handle<TrustHandler>>,
    command_timeout: Duration,
    target: String,
}

impl RemoteSession for SshSession {
    fn run(&mut self, command: &RemoteCommand) -> Result<String> {
        let describe = command.describe();
        let handle = self.handle.as_ref().ok_or_else(|| Error::RemoteExec {
            command: describe.clone(),
            cause: "session is closed".into(),
        })?;
        let shell = command.to_shell();
        let after = self.command_timeout;
        debug!(target = %self.target, command = %describe, "running remote command");

        let output = self
            .runtime
            .block_on(async { timeout(after, exec(handle, &shell)).await })
            .map_err(|_| Error::Timeout {
                operation: describe.clone(),
                after,
            })?
            .map_err(|e| Error::RemoteExec {
                command: describe.clone(),
                cause: e.to_string(),
            })?;

        match output.exit_status {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            status => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let cause = match status {
                    Some(code) => format!("exit status {}", code),
                    None => "channel closed without exit status".to_string(),
                };
                let cause = if stderr.trim().is_empty() {
                    cause
                } else {
                    format!("{}: {}", cause, stderr.trim())
                };
                Err(Error::RemoteExec {
                    command: describe,
                    cause,
                })
            }
        }
    }

    fn close(mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            debug!(target = %self.target, "closing SSH session");
            self.runtime
                .block_on(handle.disconnect(Disconnect::ByApplication, "", "en"))?;
        }
        Ok(())
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self
                .runtime
                .block_on(handle.disconnect(Disconnect::ByApplication, "", "en"))
            {
                warn!(target = %self.target, error = %e, "SSH disconnect failed");
            }
        }
    }
}
