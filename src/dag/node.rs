// src/dag/node.rs

//! Work nodes and their per-run state.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::atomic::{AtomicInt, AtomicString};

/// Lifecycle of a node. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Waiting,
    Ready,
    Running,
    Success,
    PartialFailure,
    Failed,
    Skipped,
}

impl NodeStatus {
    fn rank(self) -> u8 {
        match self {
            NodeStatus::Waiting => 0,
            NodeStatus::Ready => 1,
            NodeStatus::Running => 2,
            NodeStatus::Success
            | NodeStatus::PartialFailure
            | NodeStatus::Failed
            | NodeStatus::Skipped => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    /// Whether `self -> next` moves strictly forward.
    pub fn can_advance_to(self, next: NodeStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Waiting => "waiting",
            NodeStatus::Ready => "ready",
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::PartialFailure => "partial_failure",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Aggregated outcome pushed from a finished node onto its successors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreStatus {
    Unknown,
    Success,
    Failed,
}

const PRE_UNKNOWN: i64 = 0;
const PRE_SUCCESS: i64 = 1;
const PRE_FAILED: i64 = 2;

/// Step attributes the scheduler needs at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRef {
    pub module: String,
    pub essential: bool,
    pub ignore_result: bool,
    /// Index into the task detail's `case_list`.
    pub case: usize,
}

/// Scheduling unit wrapping one step, or a synthetic join point.
///
/// Shared between concurrent executions; every mutable attribute sits in its
/// own cell.
pub struct WorkNode {
    pub name: String,
    pub task_id: String,
    /// `None` for a synthetic node.
    pub step: Option<StepRef>,
    /// Indices of direct successors in the owning graph.
    pub successors: Vec<usize>,
    pre_status: AtomicInt,
    status_reason: AtomicString,
    dependency_account: AtomicInt,
    status: Mutex<NodeStatus>,
}

impl WorkNode {
    pub fn new(
        name: impl Into<String>,
        task_id: impl Into<String>,
        step: Option<StepRef>,
        successors: Vec<usize>,
        in_degree: usize,
    ) -> Self {
        Self {
            name: name.into(),
            task_id: task_id.into(),
            step,
            successors,
            pre_status: AtomicInt::new(PRE_UNKNOWN),
            status_reason: AtomicString::default(),
            dependency_account: AtomicInt::new(in_degree as i64),
            status: Mutex::new(NodeStatus::Waiting),
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.step.is_none()
    }

    pub fn pre_status(&self) -> PreStatus {
        match self.pre_status.get() {
            PRE_SUCCESS => PreStatus::Success,
            PRE_FAILED => PreStatus::Failed,
            _ => PreStatus::Unknown,
        }
    }

    /// Record a predecessor's outcome. A failure sticks; a later success
    /// never overwrites it.
    pub fn push_pre_status(&self, success: bool) {
        if success {
            self.pre_status.compare_and_set(PRE_UNKNOWN, PRE_SUCCESS);
        } else {
            self.pre_status.set(PRE_FAILED);
        }
    }

    pub fn dependency_account(&self) -> i64 {
        self.dependency_account.get()
    }

    /// One predecessor finished. Returns `true` exactly once: when the last
    /// outstanding predecessor is accounted for.
    pub fn release_one(&self) -> bool {
        matches!(self.dependency_account.decrement(), Some(0))
    }

    pub fn status(&self) -> NodeStatus {
        *self.status.lock()
    }

    /// Move to `next` if that is a forward transition. Returns whether the
    /// transition happened.
    pub fn advance(&self, next: NodeStatus) -> bool {
        let mut status = self.status.lock();
        if status.can_advance_to(next) {
            *status = next;
            true
        } else {
            false
        }
    }

    pub fn status_reason(&self) -> String {
        self.status_reason.get()
    }

    pub fn add_reason(&self, reason: &str) {
        self.status_reason.append(reason);
    }
}

impl fmt::Debug for WorkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkNode")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("pre_status", &self.pre_status())
            .field("dependency_account", &self.dependency_account())
            .field("successors", &self.successors)
            .finish()
    }
}
