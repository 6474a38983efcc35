// src/dag/state_manager.rs

//! Per-run state transitions across node boundaries.

use tracing::{debug, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::node::NodeStatus;

/// Pushes a finished node's outcome to its successors and releases those
/// whose last predecessor just finished.
///
/// Works purely through the nodes' own cells; there is no graph-wide lock.
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a TaskGraph) -> Self {
        Self { graph }
    }

    /// Push `success` as the pre-status of every direct successor of `from`,
    /// then decrement their dependency accounts.
    ///
    /// Returns the successors that became ready, each exactly once over the
    /// whole run.
    pub fn propagate(&self, from: usize, success: bool) -> Vec<usize> {
        let Some(node) = self.graph.node(from) else {
            warn!(node = from, "propagate called for unknown node");
            return Vec::new();
        };

        let mut released = Vec::new();
        for &succ_idx in node.successors.iter() {
            let Some(succ) = self.graph.node(succ_idx) else {
                continue;
            };
            // Pre-status must be visible before the account can reach zero.
            succ.push_pre_status(success);
            if succ.release_one() {
                if succ.advance(NodeStatus::Ready) {
                    debug!(node = %succ.name, from = %node.name, "dependencies finished; node ready");
                    released.push(succ_idx);
                } else {
                    warn!(node = %succ.name, status = %succ.status(), "released node was not waiting");
                }
            }
        }
        released
    }

    /// Whether every node reached a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.graph.nodes().iter().all(|n| n.status().is_terminal())
    }

    pub fn finished_count(&self) -> usize {
        self.graph
            .nodes()
            .iter()
            .filter(|n| n.status().is_terminal())
            .count()
    }
}
