// src/results/model.rs

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dag::NodeStatus;
use crate::plugins::PluginResult;

/// Outcome of one node on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub node: String,
    pub host: String,
    pub host_ip: String,
    #[serde(flatten)]
    pub result: PluginResult,
}

/// Results collected during a run.
///
/// Host executions within a batch record concurrently, so the store is
/// behind its own lock.
#[derive(Debug, Default)]
pub struct ResultStore {
    results: Mutex<Vec<TaskResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: TaskResult) {
        self.results.lock().push(result);
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<TaskResult> {
        self.results.lock().clone()
    }

    pub fn for_node(&self, node: &str) -> Vec<TaskResult> {
        self.results
            .lock()
            .iter()
            .filter(|r| r.node == node)
            .cloned()
            .collect()
    }
}

/// Aggregate status of a whole task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Success,
    PartialFailure,
    Failed,
}

impl TaskStatus {
    fn severity(self) -> u8 {
        match self {
            TaskStatus::Running => 0,
            TaskStatus::Success => 1,
            TaskStatus::PartialFailure => 2,
            TaskStatus::Failed => 3,
        }
    }

    /// The worse of two outcomes.
    pub fn worst(self, other: TaskStatus) -> TaskStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Contribution of one finished node; skipped counts as failed.
    pub fn from_node(status: NodeStatus) -> Option<TaskStatus> {
        match status {
            NodeStatus::Success => Some(TaskStatus::Success),
            NodeStatus::PartialFailure => Some(TaskStatus::PartialFailure),
            NodeStatus::Failed | NodeStatus::Skipped => Some(TaskStatus::Failed),
            NodeStatus::Waiting | NodeStatus::Ready | NodeStatus::Running => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::PartialFailure => "partial_failure",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Receives aggregate status and progress (0..=100) updates.
pub trait StatusSink: Send + Sync {
    fn update(&self, task_id: &str, status: TaskStatus, progress: u8);
}

/// Default sink: log every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn update(&self, task_id: &str, status: TaskStatus, progress: u8) {
        info!(task = %task_id, %status, progress, "task status update");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub name: String,
    pub status: NodeStatus,
    pub reason: String,
}

/// Final summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub nodes: Vec<NodeReport>,
    pub results: Vec<TaskResult>,
}

impl TaskReport {
    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn results_for(&self, node: &str) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(move |r| r.node == node)
    }

    pub fn to_json(&self) -> crate::errors::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
