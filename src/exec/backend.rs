// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The dispatcher talks to an `ExecutorBackend` for each (node, host) pair.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production implementation in [`remote_client`](super::remote_client).
//!
//! - `RemoteExecutor` is the default implementation: it opens the host's
//!   channels, runs the plugin and closes the connection.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which hosts ran and returns canned results.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::config::HostDescriptor;
use crate::plugins::{ExecutionMeta, PluginResult};

/// One action on one host.
#[derive(Debug, Clone)]
pub struct HostJob {
    pub host: HostDescriptor,
    pub module: String,
    pub params: Value,
    pub meta: ExecutionMeta,
}

/// Trait abstracting how a single host execution is carried out.
///
/// Implementations never fail: every problem becomes a [`PluginResult`] with
/// the matching result code, so one host never aborts its batch.
pub trait ExecutorBackend: Send + Sync {
    fn execute(&self, job: HostJob) -> Pin<Box<dyn Future<Output = PluginResult> + Send + '_>>;
}
