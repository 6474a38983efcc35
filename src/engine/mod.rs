// src/engine/mod.rs

//! Orchestration engine for opsflow.
//!
//! This module ties together:
//! - the scheduler, which decides which nodes run
//! - the dispatcher, which fans each node out over its hosts
//! - the completion callback, which collects host results and releases the
//!   next layer of nodes
//! - status and progress reporting
//!
//! Progress and aggregate status live in the pure [`core`]; the async loop
//! is implemented in [`runtime`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::HostDescriptor;
use crate::dag::SchedulerStep;
use crate::results::TaskResult;

/// Receives every host-level result of one node.
///
/// Called concurrently from every execution of a batch.
pub type CompletionCallback = Arc<dyn Fn(TaskResult) + Send + Sync>;

/// Everything needed to dispatch one node. Built fresh per dispatch.
#[derive(Clone)]
pub struct TaskContext {
    pub hosts: Vec<HostDescriptor>,
    pub module: String,
    pub params: Value,
    pub batch_size: usize,
    pub timeout: Duration,
    pub node_name: String,
    pub task_id: String,
    pub result_dir: PathBuf,
    pub callback: CompletionCallback,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("node_name", &self.node_name)
            .field("module", &self.module)
            .field("hosts", &self.hosts.len())
            .field("batch_size", &self.batch_size)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Events flowing into the runtime loop.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A node reached a terminal status; `released` successors are ready.
    NodeFinished(SchedulerStep),
}

pub mod completion;
pub mod core;
pub mod runtime;

pub use completion::NodeCompletion;
pub use self::core::CoreRuntime;
pub use runtime::Runtime;
