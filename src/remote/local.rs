// src/remote/local.rs

//! Channels for hosts reached through the controller itself.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::HostDescriptor;

use super::{Channels, CommandOutput, Connector, FileTransfer, RemoteError, RemoteStat, Shell};

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnector;

#[async_trait]
impl Connector for LocalConnector {
    async fn open(&self, host: &HostDescriptor) -> Result<Channels, RemoteError> {
        debug!(host = %host.id, "opening local channels");
        Ok(Channels::new(
            host.id.clone(),
            Box::new(LocalShell),
            Box::new(LocalTransfer),
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalShell;

#[async_trait]
impl Shell for LocalShell {
    async fn exec(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RemoteError::Exec(format!("spawning `sh -c`: {e}")))?;

        Ok(CommandOutput {
            exit_status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn close(&self) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransfer;

#[async_trait]
impl FileTransfer for LocalTransfer {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        tokio::fs::copy(local, remote)
            .await
            .map_err(|e| RemoteError::Transfer(format!("copy {:?} -> {remote}: {e}", local)))?;
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        tokio::fs::copy(remote, local)
            .await
            .map_err(|e| RemoteError::Transfer(format!("copy {remote} -> {:?}: {e}", local)))?;
        Ok(())
    }

    async fn write(&self, remote: &str, data: &[u8]) -> Result<(), RemoteError> {
        tokio::fs::write(remote, data)
            .await
            .map_err(|e| RemoteError::Transfer(format!("write {remote}: {e}")))?;
        Ok(())
    }

    async fn stat(&self, remote: &str) -> Result<Option<RemoteStat>, RemoteError> {
        match tokio::fs::metadata(remote).await {
            Ok(meta) => Ok(Some(RemoteStat {
                is_dir: meta.is_dir(),
                size: meta.len(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn mkdir_all(&self, remote: &str) -> Result<(), RemoteError> {
        tokio::fs::create_dir_all(remote).await?;
        Ok(())
    }

    async fn remove(&self, remote: &str) -> Result<(), RemoteError> {
        tokio::fs::remove_file(remote).await?;
        Ok(())
    }
}
