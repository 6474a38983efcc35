// src/plugins/mod.rs

//! Remote actions.
//!
//! Every action implements [`Plugin`]: given the host's shell and
//! file-transfer channels, the step parameters and the host descriptor, it
//! produces one [`PluginResult`].
//!
//! Plugins are looked up by module name in a static [`PluginRegistry`]. The
//! registry also parses step parameters, so unknown modules and bad
//! parameters are rejected when the graph is built, not halfway through a run.

pub mod copy;
pub mod fetch;
pub mod ping;
pub mod registry;
pub mod script;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::HostDescriptor;
use crate::remote::{Channels, FileTransfer, RemoteError, Shell};

pub use copy::CopyPlugin;
pub use fetch::FetchPlugin;
pub use ping::PingPlugin;
pub use registry::PluginRegistry;
pub use script::{CommandPlugin, ScriptPlugin};

/// Outcome code of one action on one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Success,
    /// Generic failure, including errors the plugin did not classify.
    Failed,
    /// Skipped because a predecessor node failed.
    PreDependencyError,
    ConnectionFailed,
    LocalPathMissing,
    RemotePathMissing,
    PathIsDirectory,
    IntegrityMismatch,
    Timeout,
    Unreachable,
    NonZeroExit,
    InvalidParams,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

/// `{error_code, error_msg}` for one action on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResult {
    pub error_code: ResultCode,
    pub error_msg: String,
}

impl PluginResult {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            error_code: ResultCode::Success,
            error_msg: msg.into(),
        }
    }

    pub fn failure(code: ResultCode, msg: impl Into<String>) -> Self {
        Self {
            error_code: code,
            error_msg: msg.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code.is_success()
    }
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("local path not found: {0}")]
    LocalPathMissing(String),

    #[error("remote path not found: {0}")]
    RemotePathMissing(String),

    #[error("{0} is a directory")]
    PathIsDirectory(String),

    #[error("integrity check failed for {path}: local {local}, remote {remote}")]
    IntegrityMismatch {
        path: String,
        local: String,
        remote: String,
    },

    #[error("command exited with status {status}: {output}")]
    NonZeroExit { status: i32, output: String },

    #[error("host unreachable: {0}")]
    Unreachable(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("plugin requires a connection but none was opened")]
    NoConnection,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] crate::errors::OpsflowError),
}

impl PluginError {
    pub fn code(&self) -> ResultCode {
        match self {
            PluginError::LocalPathMissing(_) => ResultCode::LocalPathMissing,
            PluginError::RemotePathMissing(_) => ResultCode::RemotePathMissing,
            PluginError::PathIsDirectory(_) => ResultCode::PathIsDirectory,
            PluginError::IntegrityMismatch { .. } => ResultCode::IntegrityMismatch,
            PluginError::NonZeroExit { .. } => ResultCode::NonZeroExit,
            PluginError::Unreachable(_) => ResultCode::Unreachable,
            PluginError::InvalidParams(_) => ResultCode::InvalidParams,
            PluginError::Remote(RemoteError::Connect { .. } | RemoteError::Auth { .. }) => {
                ResultCode::ConnectionFailed
            }
            PluginError::NoConnection
            | PluginError::Remote(_)
            | PluginError::Io(_)
            | PluginError::Other(_) => ResultCode::Failed,
        }
    }
}

impl From<PluginError> for PluginResult {
    fn from(err: PluginError) -> Self {
        PluginResult::failure(err.code(), err.to_string())
    }
}

/// Where in the task an execution belongs; used for result logs.
#[derive(Debug, Clone)]
pub struct ExecutionMeta {
    pub task_id: String,
    pub node_name: String,
    pub result_dir: PathBuf,
}

/// Everything a plugin sees while running on one host.
pub struct PluginContext<'a> {
    pub host: &'a HostDescriptor,
    pub meta: &'a ExecutionMeta,
    channels: Option<&'a Channels>,
}

impl<'a> PluginContext<'a> {
    pub fn new(
        host: &'a HostDescriptor,
        meta: &'a ExecutionMeta,
        channels: Option<&'a Channels>,
    ) -> Self {
        Self {
            host,
            meta,
            channels,
        }
    }

    pub fn shell(&self) -> Result<&'a dyn Shell, PluginError> {
        self.channels
            .map(|c| c.shell.as_ref())
            .ok_or(PluginError::NoConnection)
    }

    pub fn transfer(&self) -> Result<&'a dyn FileTransfer, PluginError> {
        self.channels
            .map(|c| c.transfer.as_ref())
            .ok_or(PluginError::NoConnection)
    }

    /// Login home directory on the host.
    pub async fn remote_home(&self) -> Result<String, PluginError> {
        let out = self.shell()?.exec("printf '%s' \"$HOME\"").await?;
        let home = out.stdout.trim().to_string();
        if !out.success() || home.is_empty() {
            return Err(PluginError::NonZeroExit {
                status: out.exit_status,
                output: format!("could not resolve home directory: {}", out.combined()),
            });
        }
        Ok(home)
    }

    /// SHA-256 of a remote file, via `sha256sum` on the host.
    pub async fn remote_hash(&self, path: &str) -> Result<String, PluginError> {
        let cmd = format!("sha256sum {}", crate::remote::shell_quote(path));
        let out = self.shell()?.exec(&cmd).await?;
        if !out.success() {
            return Err(PluginError::NonZeroExit {
                status: out.exit_status,
                output: out.combined(),
            });
        }
        crate::crypto::parse_sha256sum_output(&out.stdout).ok_or_else(|| {
            PluginError::NonZeroExit {
                status: out.exit_status,
                output: format!("unexpected sha256sum output: {}", out.stdout.trim()),
            }
        })
    }
}

/// One remote action.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Module name used in definitions.
    fn name(&self) -> &str;

    /// Whether the execution client has to open the host's channels first.
    fn needs_connection(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &PluginContext<'_>) -> Result<PluginResult, PluginError>;
}

/// Parse a step's JSON parameters into a plugin's typed parameters.
pub fn parse_params<T: serde::de::DeserializeOwned>(
    params: &serde_json::Value,
) -> Result<T, PluginError> {
    serde_json::from_value(params.clone()).map_err(|e| PluginError::InvalidParams(e.to_string()))
}

/// Compare a remote file's hash with the expected local digest.
pub(crate) async fn verify_integrity(
    ctx: &PluginContext<'_>,
    remote_path: &str,
    local_hash: &str,
) -> Result<(), PluginError> {
    let remote_hash = ctx.remote_hash(remote_path).await?;
    if remote_hash != local_hash {
        return Err(PluginError::IntegrityMismatch {
            path: remote_path.to_string(),
            local: local_hash.to_string(),
            remote: remote_hash,
        });
    }
    tracing::debug!(host = %ctx.host.id, path = %remote_path, "integrity verified");
    Ok(())
}

/// Expand a leading `~` using the host's login home directory.
pub(crate) async fn resolve_remote_path(
    ctx: &PluginContext<'_>,
    path: &str,
) -> Result<String, PluginError> {
    if path == "~" || path.starts_with("~/") {
        let home = ctx.remote_home().await?;
        Ok(crate::remote::expand_home(path, &home))
    } else {
        Ok(path.to_string())
    }
}
