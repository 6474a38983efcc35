// src/results/log.rs

//! Per-host result logs on the controller.
//!
//! Layout: `<result_dir>/<task_id>/<kind>/<host_ip>.log`. Script and command
//! executions append one timestamped record per run.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::Result;

/// Which action family a log belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Script,
    Command,
}

impl LogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::Script => "script",
            LogKind::Command => "command",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a result lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultLookup {
    /// The task is still running; ask again later.
    Repeat,
    /// Nothing has been recorded for this host yet.
    NotFound,
    Found(String),
}

#[derive(Debug, Clone)]
pub struct ResultLog {
    root: PathBuf,
}

impl ResultLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, task_id: &str, kind: LogKind, host_ip: &str) -> PathBuf {
        self.root
            .join(task_id)
            .join(kind.as_str())
            .join(format!("{host_ip}.log"))
    }

    /// Append one record, creating directories as needed.
    pub async fn append(
        &self,
        task_id: &str,
        kind: LogKind,
        host_ip: &str,
        node: &str,
        exit_status: i32,
        output: &str,
    ) -> Result<PathBuf> {
        let path = self.path(task_id, kind, host_ip);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut record = format!(
            "[{}] node={node} exit={exit_status}\n{output}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        if !record.ends_with('\n') {
            record.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(record.as_bytes()).await?;
        file.flush().await?;

        debug!(path = ?path, node = %node, "appended result record");
        Ok(path)
    }

    /// Read the log for one host.
    ///
    /// A running task yields [`ResultLookup::Repeat`] without touching the
    /// file, so callers never see a half-written result.
    pub async fn lookup(
        &self,
        task_id: &str,
        kind: LogKind,
        host_ip: &str,
        running: bool,
    ) -> Result<ResultLookup> {
        if running {
            return Ok(ResultLookup::Repeat);
        }
        match tokio::fs::read_to_string(self.path(task_id, kind, host_ip)).await {
            Ok(text) => Ok(ResultLookup::Found(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ResultLookup::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}
