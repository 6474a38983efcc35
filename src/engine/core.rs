// src/engine/core.rs

//! Pure progress and status aggregation.
//!
//! No Tokio, channels or IO: the runtime feeds it terminal node statuses and
//! reads back the aggregate.

use crate::dag::NodeStatus;
use crate::results::TaskStatus;

#[derive(Debug, Clone)]
pub struct CoreRuntime {
    total: usize,
    finished: usize,
    worst: Option<TaskStatus>,
}

impl CoreRuntime {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            finished: 0,
            worst: None,
        }
    }

    /// Record one node reaching a terminal status.
    pub fn record(&mut self, status: NodeStatus) {
        let Some(outcome) = TaskStatus::from_node(status) else {
            return;
        };
        self.finished = (self.finished + 1).min(self.total);
        self.worst = Some(match self.worst {
            Some(worst) => worst.worst(outcome),
            None => outcome,
        });
    }

    pub fn is_done(&self) -> bool {
        self.finished >= self.total
    }

    /// Finished nodes x 100 / total nodes.
    pub fn progress(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.finished * 100) / self.total) as u8
    }

    /// `Running` until every node finished, then the worst node outcome.
    pub fn status(&self) -> TaskStatus {
        if !self.is_done() {
            return TaskStatus::Running;
        }
        self.worst.unwrap_or(TaskStatus::Success)
    }

    /// Worst outcome seen so far, regardless of completion.
    pub fn worst(&self) -> Option<TaskStatus> {
        self.worst
    }
}
