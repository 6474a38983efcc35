// src/plugins/ping.rs

//! ICMP reachability probe, run from the controller.

use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::{parse_params, Plugin, PluginContext, PluginError, PluginResult};

fn default_count() -> u32 {
    3
}

fn default_timeout() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PingParams {
    /// Echo requests to send.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Seconds to wait for each reply.
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    /// Address to probe; defaults to the host's ip.
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PingPlugin {
    params: PingParams,
}

impl PingPlugin {
    pub fn new(params: PingParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &serde_json::Value) -> Result<Self, PluginError> {
        let params: PingParams = parse_params(params)?;
        if params.count == 0 || params.timeout == 0 {
            return Err(PluginError::InvalidParams(
                "count and timeout must be at least 1".into(),
            ));
        }
        Ok(Self::new(params))
    }
}

static PACKET_LOSS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)% packet loss").ok());

/// Packet loss percentage reported by `ping`'s summary line.
pub fn packet_loss(output: &str) -> Option<f64> {
    let caps = PACKET_LOSS.as_ref()?.captures(output)?;
    caps.get(1)?.as_str().parse().ok()
}

#[async_trait]
impl Plugin for PingPlugin {
    fn name(&self) -> &str {
        "ping"
    }

    fn needs_connection(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &PluginContext<'_>) -> Result<PluginResult, PluginError> {
        let target = self.params.target.as_deref().unwrap_or(&ctx.host.ip);

        debug!(host = %ctx.host.id, target = %target, count = self.params.count, "pinging");

        let output = Command::new("ping")
            .arg("-c")
            .arg(self.params.count.to_string())
            .arg("-W")
            .arg(self.params.timeout.to_string())
            .arg(target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match packet_loss(&stdout) {
            Some(loss) if loss < 100.0 => {
                info!(host = %ctx.host.id, target = %target, loss, "host is up");
                Ok(PluginResult::success(format!(
                    "{target} is up ({loss}% packet loss)"
                )))
            }
            Some(_) => Err(PluginError::Unreachable(format!(
                "{target}: 100% packet loss"
            ))),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(PluginError::Unreachable(format!(
                    "{target}: {}",
                    stderr.trim()
                )))
            }
        }
    }
}
