// src/plugins/script.rs

//! Script and command execution.
//!
//! - `shell` uploads a script into a fresh temporary directory on the host,
//!   verifies it, runs it and cleans up.
//! - `script` does the same and appends the output to the host's result log.
//! - `command` runs an ordered list of commands, stopping at the first
//!   non-zero exit, and logs the combined output.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::compute_bytes_hash;
use crate::remote::{shell_quote, CommandOutput};
use crate::results::{LogKind, ResultLog};

use super::copy::check_local_file;
use super::{parse_params, verify_integrity, Plugin, PluginContext, PluginError, PluginResult};

fn default_interpreter() -> String {
    "sh".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptParams {
    /// Local script file.
    #[serde(default)]
    pub src: Option<PathBuf>,
    /// Inline script body, usually filled in from the action catalog.
    #[serde(default)]
    pub content: Option<String>,
    /// Action catalog id; replaced by `content` when the graph is built.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
}

impl ScriptParams {
    fn validate(&self) -> Result<(), PluginError> {
        if let Some(ref action) = self.action {
            return Err(PluginError::InvalidParams(format!(
                "action {action:?} was not resolved to script content"
            )));
        }
        match (&self.src, &self.content) {
            (Some(_), Some(_)) => Err(PluginError::InvalidParams(
                "src and content are mutually exclusive".into(),
            )),
            (None, None) => Err(PluginError::InvalidParams(
                "one of src, content or action is required".into(),
            )),
            _ if self.interpreter.trim().is_empty() => {
                Err(PluginError::InvalidParams("interpreter must not be empty".into()))
            }
            _ => Ok(()),
        }
    }

    fn script_name(&self) -> String {
        self.src
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script.sh".to_string())
    }

    async fn body(&self) -> Result<Vec<u8>, PluginError> {
        match (&self.src, &self.content) {
            (Some(src), _) => {
                check_local_file(src).await?;
                Ok(tokio::fs::read(src).await?)
            }
            (None, Some(content)) => Ok(content.clone().into_bytes()),
            (None, None) => Err(PluginError::InvalidParams("no script body".into())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptPlugin {
    params: ScriptParams,
    log: Option<LogKind>,
}

impl ScriptPlugin {
    /// Run a script without recording a result log.
    pub fn shell(params: &serde_json::Value) -> Result<Self, PluginError> {
        let params: ScriptParams = parse_params(params)?;
        params.validate()?;
        Ok(Self { params, log: None })
    }

    /// Run a script and append its output to the per-host result log.
    pub fn script(params: &serde_json::Value) -> Result<Self, PluginError> {
        let params: ScriptParams = parse_params(params)?;
        params.validate()?;
        Ok(Self {
            params,
            log: Some(LogKind::Script),
        })
    }
}

/// Unique per-execution working directory on the host.
fn temp_dir_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "/tmp/opsflow_{}_{}",
        Local::now().format("%Y%m%d%H%M%S%3f"),
        &id[..8]
    )
}

#[async_trait]
impl Plugin for ScriptPlugin {
    fn name(&self) -> &str {
        match self.log {
            Some(_) => "script",
            None => "shell",
        }
    }

    async fn run(&self, ctx: &PluginContext<'_>) -> Result<PluginResult, PluginError> {
        let body = self.params.body().await?;
        let transfer = ctx.transfer()?;
        let shell = ctx.shell()?;

        let dir = temp_dir_name();
        let script = format!("{dir}/{}", self.params.script_name());

        transfer.mkdir_all(&dir).await?;
        let result = async {
            transfer.write(&script, &body).await?;
            verify_integrity(ctx, &script, &compute_bytes_hash(&body)).await?;

            let mut cmd = format!(
                "cd {} && {} {}",
                shell_quote(&dir),
                self.params.interpreter,
                shell_quote(&script)
            );
            for arg in &self.params.args {
                cmd.push(' ');
                cmd.push_str(&shell_quote(arg));
            }
            cmd.push_str(" 2>&1");

            debug!(host = %ctx.host.id, script = %script, "running script");
            Ok::<CommandOutput, PluginError>(shell.exec(&cmd).await?)
        }
        .await;

        if let Err(e) = shell.exec(&format!("rm -rf {}", shell_quote(&dir))).await {
            warn!(host = %ctx.host.id, dir = %dir, error = %e, "failed to remove script directory");
        }

        let out = result?;
        let output = out.combined();

        if let Some(kind) = self.log {
            record(ctx, kind, out.exit_status, &output).await?;
        }

        finish(ctx, out.exit_status, output)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandParams {
    #[serde(default)]
    pub commands: Vec<String>,
    /// Action catalog id; its content lines become `commands`.
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandPlugin {
    commands: Vec<String>,
}

impl CommandPlugin {
    pub fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }

    pub fn from_params(params: &serde_json::Value) -> Result<Self, PluginError> {
        let params: CommandParams = parse_params(params)?;
        if let Some(action) = params.action {
            return Err(PluginError::InvalidParams(format!(
                "action {action:?} was not resolved to commands"
            )));
        }
        if params.commands.iter().all(|c| c.trim().is_empty()) {
            return Err(PluginError::InvalidParams(
                "commands must contain at least one command".into(),
            ));
        }
        Ok(Self::new(params.commands))
    }
}

#[async_trait]
impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        "command"
    }

    async fn run(&self, ctx: &PluginContext<'_>) -> Result<PluginResult, PluginError> {
        let shell = ctx.shell()?;
        let mut output = String::new();
        let mut exit_status = 0;

        for cmd in self.commands.iter().filter(|c| !c.trim().is_empty()) {
            let out = shell.exec(&format!("{cmd} 2>&1")).await?;
            output.push_str(&format!("$ {cmd}\n"));
            output.push_str(&out.combined());
            if !output.ends_with('\n') {
                output.push('\n');
            }
            exit_status = out.exit_status;
            if !out.success() {
                warn!(host = %ctx.host.id, command = %cmd, exit_status, "command failed; stopping");
                break;
            }
        }

        record(ctx, LogKind::Command, exit_status, &output).await?;
        finish(ctx, exit_status, output)
    }
}

async fn record(
    ctx: &PluginContext<'_>,
    kind: LogKind,
    exit_status: i32,
    output: &str,
) -> Result<(), PluginError> {
    ResultLog::new(&ctx.meta.result_dir)
        .append(
            &ctx.meta.task_id,
            kind,
            &ctx.host.ip,
            &ctx.meta.node_name,
            exit_status,
            output,
        )
        .await?;
    Ok(())
}

fn finish(
    ctx: &PluginContext<'_>,
    exit_status: i32,
    output: String,
) -> Result<PluginResult, PluginError> {
    if exit_status != 0 {
        return Err(PluginError::NonZeroExit {
            status: exit_status,
            output,
        });
    }
    info!(host = %ctx.host.id, node = %ctx.meta.node_name, "execution finished");
    Ok(PluginResult::success(output))
}
