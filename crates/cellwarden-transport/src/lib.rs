//! `cellwarden-transport` – the remote command channel.
//!
//! The engine never speaks SSH directly. It executes commands through the
//! [`Transport`] trait and receives the remote `(stdout, stderr)` pair;
//! everything router-specific lives behind this seam, so tests drive the
//! executor and control loop with scripted in-memory transports.
//!
//! [`SshTransport`] is the production implementation: it shells out to the
//! system `ssh` client (via `sshpass` when a password is configured) with
//! bounded connect and command timeouts.

pub mod ssh;

use async_trait::async_trait;
use thiserror::Error;

pub use ssh::SshTransport;

/// What the router said in reply to one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// `true` when the remote produced error output.
    pub fn has_error(&self) -> bool {
        !self.stderr.trim().is_empty()
    }
}

/// Errors from the command channel itself – distinct from a command that
/// ran remotely and merely printed to stderr.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection to router failed: {0}")]
    Connect(String),

    #[error("command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The opaque `execute(command) → (stdout, stderr)` capability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run one shell command on the router and capture its output.
    ///
    /// A command that executes remotely but writes to stderr returns
    /// `Ok` – the caller decides how loud to be about it. `Err` means the
    /// channel itself failed (unreachable host, auth, timeout).
    async fn execute(&self, command: &str) -> Result<CommandOutput, TransportError>;
}
