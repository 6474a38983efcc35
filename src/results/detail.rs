// src/results/detail.rs

//! Task Detail: which hosts run which actions.
//!
//! The detail is built once per task, in a fixed order:
//!
//! 1. `node_list`: every distinct host the task touches.
//! 2. `case_list`: one action bundle per step.
//! 3. `case_nodes`: for each bundle (same index), host index -> item indices.
//!
//! Later parts only index into earlier ones. Once built the value is never
//! mutated; the dispatcher reads host lists and parameters from it, and it
//! can be persisted as JSON and loaded back for result lookups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HostDescriptor;
use crate::errors::Result;

/// One step's actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBundle {
    /// Qualified node name (`job:step`).
    pub node: String,
    pub module: String,
    /// Resolved plugin parameters.
    pub params: Value,
    /// Individual actions: one per command for `command`, otherwise one.
    pub items: Vec<Value>,
    pub essential: bool,
    pub ignore_result: bool,
}

impl CaseBundle {
    pub fn new(
        node: impl Into<String>,
        module: impl Into<String>,
        params: Value,
        essential: bool,
        ignore_result: bool,
    ) -> Self {
        let module = module.into();
        let items = match params.get("commands").and_then(Value::as_array) {
            Some(commands) if module == "command" => commands.clone(),
            _ => vec![params.clone()],
        };
        Self {
            node: node.into(),
            module,
            params,
            items,
            essential,
            ignore_result,
        }
    }
}

/// Host -> item mapping for the bundle with the same index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaseNodes {
    /// Index into `node_list` -> indices into the bundle's `items`.
    pub hosts: BTreeMap<usize, Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskDetail {
    pub node_list: Vec<HostDescriptor>,
    pub case_list: Vec<CaseBundle>,
    pub case_nodes: Vec<CaseNodes>,
}

impl TaskDetail {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Index of the bundle for a node.
    pub fn case_index(&self, node: &str) -> Option<usize> {
        self.case_list.iter().position(|c| c.node == node)
    }

    /// Hosts assigned to a bundle, in `node_list` order.
    pub fn hosts_for(&self, case: usize) -> Vec<HostDescriptor> {
        self.case_nodes
            .get(case)
            .map(|mapping| {
                mapping
                    .hosts
                    .keys()
                    .filter_map(|&idx| self.node_list.get(idx).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn host_index(&self, host_id: &str) -> Option<usize> {
        self.node_list.iter().position(|h| h.id == host_id)
    }
}

/// Builds a [`TaskDetail`] in node list -> case list -> case nodes order.
///
/// Each stage consumes the builder and returns the next one, so the order
/// cannot be violated.
#[derive(Debug, Default)]
pub struct DetailBuilder {
    node_list: Vec<HostDescriptor>,
}

impl DetailBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host once; returns its index either way.
    pub fn host(&mut self, host: &HostDescriptor) -> usize {
        match self.node_list.iter().position(|h| h.id == host.id) {
            Some(idx) => idx,
            None => {
                self.node_list.push(host.clone());
                self.node_list.len() - 1
            }
        }
    }

    pub fn cases(self, case_list: Vec<CaseBundle>) -> CaseStage {
        CaseStage {
            node_list: self.node_list,
            case_list,
        }
    }
}

#[derive(Debug)]
pub struct CaseStage {
    node_list: Vec<HostDescriptor>,
    case_list: Vec<CaseBundle>,
}

impl CaseStage {
    /// Map each bundle to its hosts, given as host ids per bundle.
    ///
    /// Every host of a bundle runs all of its items. Ids missing from the
    /// node list are ignored.
    pub fn map_hosts(self, hosts_per_case: &[Vec<String>]) -> TaskDetail {
        let case_nodes = self
            .case_list
            .iter()
            .enumerate()
            .map(|(i, case)| {
                let items: Vec<usize> = (0..case.items.len()).collect();
                let hosts = hosts_per_case
                    .get(i)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(|id| self.node_list.iter().position(|h| &h.id == id))
                            .map(|idx| (idx, items.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                CaseNodes { hosts }
            })
            .collect();

        TaskDetail {
            node_list: self.node_list,
            case_list: self.case_list,
            case_nodes,
        }
    }
}
