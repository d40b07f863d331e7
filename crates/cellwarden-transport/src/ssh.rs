//! [`SshTransport`] – command execution over the system `ssh` client.
//!
//! No ssh library crate; the battle-tested OpenSSH client does the protocol
//! work. Password authentication goes through `sshpass` so the daemon can
//! run unattended against routers that only offer password login; with no
//! password configured, `BatchMode=yes` forces key-based auth and fails
//! fast instead of prompting.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{CommandOutput, Transport, TransportError};

/// OpenSSH exits with 255 when the connection itself fails (unreachable,
/// auth rejected), as opposed to the remote command's own exit status.
const SSH_CONNECT_FAILURE: i32 = 255;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// SSH-backed [`Transport`] for a single router.
pub struct SshTransport {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshTransport {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Build the local argv for one remote command.
    fn build_args(&self, command: &str) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        if let Some(ref pass) = self.password {
            args.extend(["sshpass".into(), "-p".into(), pass.clone(), "ssh".into()]);
        } else {
            args.push("ssh".into());
            args.extend(["-o".into(), "BatchMode=yes".into()]);
        }
        args.extend([
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-o".into(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs()),
            "-p".into(),
            self.port.to_string(),
            format!("{}@{}", self.user, self.host),
            command.to_string(),
        ]);
        args
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn execute(&self, command: &str) -> Result<CommandOutput, TransportError> {
        debug!(host = %self.host, command, "executing remote command");

        let mut args = self.build_args(command);
        let program = args.remove(0);

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let output = tokio::time::timeout(self.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                warn!(host = %self.host, command, "remote command timed out");
                TransportError::Timeout(self.command_timeout)
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.code() == Some(SSH_CONNECT_FAILURE) {
            return Err(TransportError::Connect(if stderr.is_empty() {
                format!("ssh exited {SSH_CONNECT_FAILURE}")
            } else {
                stderr
            }));
        }

        Ok(CommandOutput { stdout, stderr })
    }
}
