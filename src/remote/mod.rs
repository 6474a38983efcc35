// src/remote/mod.rs

//! Per-host connections.
//!
//! A connection is a pair of channels: an interactive [`Shell`] for running
//! commands and a [`FileTransfer`] channel for moving files. Plugins only ever
//! see these two traits, so the same plugin runs over SSH or locally.
//!
//! - [`ssh`] implements both channels with `ssh2` (exec channel + SFTP),
//!   authenticating by password or private key.
//! - [`local`] implements both channels on the controller itself
//!   (`sh -c` and the local filesystem), used for `mode = "local"` hosts.

pub mod local;
pub mod ssh;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::HostDescriptor;
use crate::types::ConnectionMode;

pub use local::LocalConnector;
pub use ssh::SshConnector;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("authentication to {host} failed: {reason}")]
    Auth { host: String, reason: String },

    #[error("command failed to run: {0}")]
    Exec(String),

    #[error("file transfer failed: {0}")]
    Transfer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ssh error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Captured result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Minimal metadata about a remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub is_dir: bool,
    pub size: u64,
}

/// Interactive shell channel.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Run a command through the login shell and capture its output.
    async fn exec(&self, command: &str) -> Result<CommandOutput, RemoteError>;

    /// Release the connection. Must be idempotent.
    fn close(&self);
}

/// File transfer channel.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError>;

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError>;

    /// Create or truncate a remote file with the given contents.
    async fn write(&self, remote: &str, data: &[u8]) -> Result<(), RemoteError>;

    /// `Ok(None)` if the remote path does not exist.
    async fn stat(&self, remote: &str) -> Result<Option<RemoteStat>, RemoteError>;

    /// Create a remote directory and any missing parents.
    async fn mkdir_all(&self, remote: &str) -> Result<(), RemoteError>;

    /// Remove a remote file.
    async fn remove(&self, remote: &str) -> Result<(), RemoteError>;
}

/// Both channels of one host connection.
///
/// Owned by exactly one execution. Dropping it closes the shell, so the
/// connection is released on every exit path, including timeouts that drop
/// the in-flight future.
pub struct Channels {
    pub host: String,
    pub shell: Box<dyn Shell>,
    pub transfer: Box<dyn FileTransfer>,
}

impl Channels {
    pub fn new(host: impl Into<String>, shell: Box<dyn Shell>, transfer: Box<dyn FileTransfer>) -> Self {
        Self {
            host: host.into(),
            shell,
            transfer,
        }
    }
}

impl Drop for Channels {
    fn drop(&mut self) {
        debug!(host = %self.host, "closing host connection");
        self.shell.close();
    }
}

/// Opens connections to hosts.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, host: &HostDescriptor) -> Result<Channels, RemoteError>;
}

/// Chooses SSH or local channels from the host's connection mode.
#[derive(Clone, Default)]
pub struct DefaultConnector {
    ssh: SshConnector,
    local: LocalConnector,
}

impl DefaultConnector {
    pub fn new(ssh: SshConnector) -> Self {
        Self {
            ssh,
            local: LocalConnector,
        }
    }
}

#[async_trait]
impl Connector for DefaultConnector {
    async fn open(&self, host: &HostDescriptor) -> Result<Channels, RemoteError> {
        match host.mode {
            ConnectionMode::Local => self.local.open(host).await,
            ConnectionMode::Password | ConnectionMode::Key => self.ssh.open(host).await,
        }
    }
}

/// Quote a string for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Resolve a leading `~` against the login home directory.
pub fn expand_home(path: &str, home: &str) -> String {
    let home = home.trim_end_matches('/');
    if path == "~" {
        home.to_string()
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("{home}/{rest}")
    } else {
        path.to_string()
    }
}

/// Parent directory of a remote (always `/`-separated) path.
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Final component of a remote path.
pub fn remote_basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
