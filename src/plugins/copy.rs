// src/plugins/copy.rs

//! Upload a controller-local file to a host.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::crypto::compute_file_hash;
use crate::remote::{remote_basename, remote_parent, shell_quote};

use super::{
    parse_params, resolve_remote_path, verify_integrity, Plugin, PluginContext, PluginError,
    PluginResult,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyParams {
    /// Local source file.
    pub src: PathBuf,
    /// Remote destination; a leading `~` is the login home. An existing
    /// directory receives the file under its own name.
    pub dest: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    /// Octal mode passed to `chmod`, e.g. `"0644"`.
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CopyPlugin {
    params: CopyParams,
}

impl CopyPlugin {
    pub fn new(params: CopyParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &serde_json::Value) -> Result<Self, PluginError> {
        let params: CopyParams = parse_params(params)?;
        if params.dest.trim().is_empty() {
            return Err(PluginError::InvalidParams("dest must not be empty".into()));
        }
        if let Some(ref mode) = params.mode {
            if mode.is_empty() || !mode.chars().all(|c| ('0'..='7').contains(&c)) {
                return Err(PluginError::InvalidParams(format!(
                    "mode must be octal digits, got {mode:?}"
                )));
            }
        }
        Ok(Self::new(params))
    }
}

/// Reject a missing or directory local source.
pub(crate) async fn check_local_file(path: &Path) -> Result<(), PluginError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Err(PluginError::PathIsDirectory(path.display().to_string())),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(PluginError::LocalPathMissing(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Plugin for CopyPlugin {
    fn name(&self) -> &str {
        "copy"
    }

    async fn run(&self, ctx: &PluginContext<'_>) -> Result<PluginResult, PluginError> {
        let src = &self.params.src;
        check_local_file(src).await?;

        let transfer = ctx.transfer()?;
        let mut dest = resolve_remote_path(ctx, &self.params.dest).await?;

        match transfer.stat(&dest).await? {
            Some(stat) if stat.is_dir => {
                let name = src
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| remote_basename(&src.to_string_lossy()).to_string());
                dest = format!("{}/{}", dest.trim_end_matches('/'), name);
                if let Some(existing) = transfer.stat(&dest).await? {
                    if existing.is_dir {
                        return Err(PluginError::PathIsDirectory(dest));
                    }
                    transfer.remove(&dest).await?;
                }
            }
            Some(_) => {
                debug!(host = %ctx.host.id, dest = %dest, "removing existing remote file");
                transfer.remove(&dest).await?;
            }
            None => {
                if let Some(parent) = remote_parent(&dest) {
                    if transfer.stat(parent).await?.is_none() {
                        debug!(host = %ctx.host.id, dir = %parent, "creating remote directory");
                        transfer.mkdir_all(parent).await?;
                    }
                }
            }
        }

        transfer.upload(src, &dest).await?;

        let local = src.clone();
        let local_hash =
            tokio::task::spawn_blocking(move || compute_file_hash(&local))
                .await
                .map_err(crate::remote::RemoteError::from)??;
        verify_integrity(ctx, &dest, &local_hash).await?;

        self.apply_attributes(ctx, &dest).await?;

        info!(host = %ctx.host.id, src = ?src, dest = %dest, "file copied");
        Ok(PluginResult::success(format!(
            "copied {} to {dest}",
            src.display()
        )))
    }
}

impl CopyPlugin {
    async fn apply_attributes(&self, ctx: &PluginContext<'_>, dest: &str) -> Result<(), PluginError> {
        let owner = match (&self.params.owner, &self.params.group) {
            (Some(owner), Some(group)) => Some(format!("{owner}:{group}")),
            (Some(owner), None) => Some(owner.clone()),
            (None, Some(group)) => Some(format!(":{group}")),
            (None, None) => None,
        };

        let mut commands = Vec::new();
        if let Some(owner) = owner {
            commands.push(format!("chown {} {}", shell_quote(&owner), shell_quote(dest)));
        }
        if let Some(ref mode) = self.params.mode {
            commands.push(format!("chmod {} {}", mode, shell_quote(dest)));
        }

        let shell = ctx.shell()?;
        for cmd in commands {
            let out = shell.exec(&cmd).await?;
            if !out.success() {
                return Err(PluginError::NonZeroExit {
                    status: out.exit_status,
                    output: out.combined(),
                });
            }
        }
        Ok(())
    }
}
