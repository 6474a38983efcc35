// src/dag/scheduler_step.rs

//! Result types for scheduler transitions.

use crate::config::HostDescriptor;
use crate::dag::node::NodeStatus;

/// What to do with a node that just became ready.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Synthetic join point: finishes successfully without host work.
    Synthetic,
    /// A predecessor failed and the essential policy says skip.
    Skip {
        hosts: Vec<HostDescriptor>,
        reason: String,
    },
    /// Execute the node's action on its hosts.
    Run {
        hosts: Vec<HostDescriptor>,
        module: String,
        params: serde_json::Value,
    },
    /// Not dispatchable (unknown index or not in `Ready`).
    Ignore,
}

/// Structured result of finishing one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStep {
    pub node: usize,
    /// Terminal status the node reached.
    pub status: NodeStatus,
    /// Outcome pushed to successors.
    pub pushed_success: bool,
    /// Successors that became ready as a result.
    pub released: Vec<usize>,
}
