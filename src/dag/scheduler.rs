use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::node::{NodeStatus, PreStatus};
use crate::dag::scheduler_step::{Dispatch, SchedulerStep};
use crate::dag::state_manager::StateManager;
use crate::plugins::PluginResult;
use crate::types::EssentialPolicy;

/// Aggregate per-host results into a node status.
///
/// All succeeded -> success; none -> failed; otherwise partial failure. A
/// node without hosts succeeds.
pub fn aggregate_status(results: &[PluginResult]) -> NodeStatus {
    let ok = results.iter().filter(|r| r.is_success()).count();
    if ok == results.len() {
        NodeStatus::Success
    } else if ok == 0 {
        NodeStatus::Failed
    } else {
        NodeStatus::PartialFailure
    }
}

/// Scheduler holds the immutable graph and drives each node through
/// `waiting -> ready -> running -> terminal`.
///
/// It is responsible for:
/// - marking root nodes ready at the start of a run
/// - deciding whether a ready node runs, is skipped or is a join point
/// - computing a finished node's status and releasing its successors
///
/// Every method takes `&self`; all state lives in the nodes' own cells, so a
/// single scheduler is shared by every concurrent completion.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<TaskGraph>,
    policy: EssentialPolicy,
}

impl Scheduler {
    pub fn new(graph: Arc<TaskGraph>) -> Self {
        let policy = graph.params.essential_policy;
        Self { graph, policy }
    }

    pub fn with_policy(mut self, policy: EssentialPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }

    pub fn policy(&self) -> EssentialPolicy {
        self.policy
    }

    /// Mark nodes without predecessors ready and return them.
    pub fn start(&self) -> Vec<usize> {
        let roots = self.graph.roots();
        for &idx in roots.iter() {
            if let Some(node) = self.graph.node(idx) {
                node.advance(NodeStatus::Ready);
            }
        }
        info!(
            task = %self.graph.task_name,
            roots = roots.len(),
            nodes = self.graph.len(),
            "scheduler: starting run"
        );
        roots
    }

    /// Decide what to do with a ready node and move it to `running`.
    pub fn begin(&self, idx: usize) -> Dispatch {
        let Some(node) = self.graph.node(idx) else {
            warn!(node = idx, "begin called for unknown node");
            return Dispatch::Ignore;
        };
        if node.status() != NodeStatus::Ready || !node.advance(NodeStatus::Running) {
            warn!(node = %node.name, status = %node.status(), "node is not ready; not dispatching");
            return Dispatch::Ignore;
        }

        let Some(step) = node.step.as_ref() else {
            debug!(node = %node.name, "synthetic node; no host work");
            return Dispatch::Synthetic;
        };

        let hosts = self.graph.detail.hosts_for(step.case);

        if node.pre_status() == PreStatus::Failed && self.policy.should_skip(step.essential) {
            let reason = format!("skipped: a predecessor of {} failed", node.name);
            node.add_reason(&reason);
            info!(node = %node.name, essential = step.essential, "predecessor failed; skipping node");
            return Dispatch::Skip { hosts, reason };
        }

        let params = self
            .graph
            .detail
            .case_list
            .get(step.case)
            .map(|c| c.params.clone())
            .unwrap_or_default();

        debug!(node = %node.name, module = %step.module, hosts = hosts.len(), "dispatching node");
        Dispatch::Run {
            hosts,
            module: step.module.clone(),
            params,
        }
    }

    /// Finish a node that ran (or was a join point) with these host results.
    pub fn complete(&self, idx: usize, results: &[PluginResult]) -> SchedulerStep {
        self.finish(idx, aggregate_status(results))
    }

    /// Finish a node that was skipped.
    pub fn skip(&self, idx: usize) -> SchedulerStep {
        self.finish(idx, NodeStatus::Skipped)
    }

    fn finish(&self, idx: usize, status: NodeStatus) -> SchedulerStep {
        let Some(node) = self.graph.node(idx) else {
            return SchedulerStep {
                node: idx,
                status,
                pushed_success: false,
                released: Vec::new(),
            };
        };

        if !node.advance(status) {
            warn!(node = %node.name, current = %node.status(), next = %status, "ignoring repeated completion");
            return SchedulerStep {
                node: idx,
                status: node.status(),
                pushed_success: false,
                released: Vec::new(),
            };
        }

        let ignore_result = node.step.as_ref().is_some_and(|s| s.ignore_result);
        let pushed_success = match status {
            NodeStatus::Success => true,
            NodeStatus::PartialFailure | NodeStatus::Failed => ignore_result,
            _ => false,
        };

        match status {
            NodeStatus::Success => info!(node = %node.name, "node succeeded"),
            NodeStatus::Skipped => info!(node = %node.name, "node skipped"),
            _ => {
                node.add_reason(&format!("{} finished with status {status}", node.name));
                warn!(node = %node.name, %status, ignore_result, "node did not fully succeed");
            }
        }

        let released = StateManager::new(&self.graph).propagate(idx, pushed_success);

        SchedulerStep {
            node: idx,
            status,
            pushed_success,
            released,
        }
    }

    pub fn all_terminal(&self) -> bool {
        StateManager::new(&self.graph).all_terminal()
    }
}
