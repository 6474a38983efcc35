// src/plugins/fetch.rs

//! Download a file from a host into a controller-local directory.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::OpenOptions;
use tracing::{info, warn};

use crate::crypto::compute_file_hash;
use crate::remote::{remote_basename, RemoteError};

use super::{
    parse_params, resolve_remote_path, verify_integrity, Plugin, PluginContext, PluginError,
    PluginResult,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchParams {
    /// Remote source file.
    pub src: String,
    /// Local destination directory, created if missing.
    pub dest: PathBuf,
    /// Local file name; defaults to `<host-ip>_<remote-basename>`.
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct FetchPlugin {
    params: FetchParams,
}

impl FetchPlugin {
    pub fn new(params: FetchParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &serde_json::Value) -> Result<Self, PluginError> {
        let params: FetchParams = parse_params(params)?;
        if params.src.trim().is_empty() {
            return Err(PluginError::InvalidParams("src must not be empty".into()));
        }
        if let Some(ref name) = params.filename {
            if name.is_empty() || name.contains('/') {
                return Err(PluginError::InvalidParams(format!(
                    "filename must be a plain file name, got {name:?}"
                )));
            }
        }
        Ok(Self::new(params))
    }
}

/// Reserve the first of `name`, `name(1)`, `name(2)`, ... that does not exist
/// in `dir`.
///
/// The name is claimed by creating an empty file with `create_new`, so two
/// concurrent fetches into the same directory never get the same path.
pub async fn reserve_local_path(dir: &Path, name: &str) -> io::Result<PathBuf> {
    let mut n = 0u32;
    loop {
        let candidate = match n {
            0 => dir.join(name),
            n => dir.join(format!("{name}({n})")),
        };
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl Plugin for FetchPlugin {
    fn name(&self) -> &str {
        "fetch"
    }

    async fn run(&self, ctx: &PluginContext<'_>) -> Result<PluginResult, PluginError> {
        let transfer = ctx.transfer()?;
        let src = resolve_remote_path(ctx, &self.params.src).await?;

        match transfer.stat(&src).await? {
            None => return Err(PluginError::RemotePathMissing(src)),
            Some(stat) if stat.is_dir => return Err(PluginError::PathIsDirectory(src)),
            Some(_) => {}
        }

        tokio::fs::create_dir_all(&self.params.dest).await?;

        let name = self
            .params
            .filename
            .clone()
            .unwrap_or_else(|| format!("{}_{}", ctx.host.ip, remote_basename(&src)));

        let local = if self.params.overwrite {
            self.params.dest.join(&name)
        } else {
            reserve_local_path(&self.params.dest, &name).await?
        };

        if let Err(err) = transfer.download(&src, &local).await {
            if !self.params.overwrite {
                if let Err(e) = tokio::fs::remove_file(&local).await {
                    warn!(local = ?local, error = %e, "cannot release reserved file");
                }
            }
            return Err(err.into());
        }

        let path = local.clone();
        let local_hash = tokio::task::spawn_blocking(move || compute_file_hash(&path))
            .await
            .map_err(RemoteError::from)??;
        verify_integrity(ctx, &src, &local_hash).await?;

        info!(host = %ctx.host.id, src = %src, local = ?local, "file fetched");
        Ok(PluginResult::success(local.display().to_string()))
    }
}
