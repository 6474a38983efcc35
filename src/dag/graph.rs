// src/dag/graph.rs

//! Job/step definitions -> work node graph.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ActionCatalog, GlobalParams, HostCatalog, Job, ParsedDefinition, Step};
use crate::dag::node::{StepRef, WorkNode};
use crate::errors::{OpsflowError, Result};
use crate::plugins::PluginRegistry;
use crate::results::{CaseBundle, DetailBuilder, TaskDetail};

/// Name of the synthetic root node.
pub fn synthetic_root_name(task_name: &str) -> String {
    format!("{task_name}:__start__")
}

/// Immutable graph of work nodes for one task run.
///
/// Nodes are shared (`Arc`) with the executions that finish them; only their
/// per-cell state changes during a run.
#[derive(Debug)]
pub struct TaskGraph {
    pub task_id: String,
    pub task_name: String,
    pub params: GlobalParams,
    pub detail: TaskDetail,
    nodes: Vec<Arc<WorkNode>>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Arc<WorkNode>] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> Option<&Arc<WorkNode>> {
        self.nodes.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<WorkNode>> {
        self.index_of(name).and_then(|idx| self.nodes.get(idx))
    }

    /// Nodes with no predecessors.
    pub fn roots(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&idx| self.nodes[idx].dependency_account() == 0)
            .collect()
    }

    /// Direct predecessors of a node, by name.
    pub fn predecessors_of(&self, name: &str) -> Vec<&str> {
        let Some(target) = self.index_of(name) else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .filter(|n| n.successors.contains(&target))
            .map(|n| n.name.as_str())
            .collect()
    }
}

/// Builds a [`TaskGraph`] from a parsed definition and the platform catalogs.
pub struct GraphBuilder<'a> {
    def: &'a ParsedDefinition,
    hosts: &'a HostCatalog,
    actions: &'a ActionCatalog,
    registry: &'a PluginRegistry,
    task_id: String,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        def: &'a ParsedDefinition,
        hosts: &'a HostCatalog,
        actions: &'a ActionCatalog,
        registry: &'a PluginRegistry,
    ) -> Self {
        Self {
            def,
            hosts,
            actions,
            registry,
            task_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    /// Resolve hosts and actions, validate every step against the plugin
    /// registry, reject cycles and produce the graph.
    pub fn build(self) -> Result<TaskGraph> {
        let steps: Vec<&Step> = self.def.steps().collect();

        let mut step_hosts: Vec<Vec<String>> = Vec::with_capacity(steps.len());
        let mut step_params: Vec<Value> = Vec::with_capacity(steps.len());

        for step in steps.iter() {
            let job = self.job_of(step)?;
            let job_hosts = self.resolve_hosts(&job.hosts);
            let hosts = if step.hosts.is_empty() {
                job_hosts
            } else {
                let wanted = self.resolve_hosts(&step.hosts);
                job_hosts.into_iter().filter(|h| wanted.contains(h)).collect()
            };
            if hosts.is_empty() {
                warn!(step = %step.qualified_name(), "step resolves to no hosts");
            }

            let params = self.resolve_action(step)?;
            let mut resolved = (*step).clone();
            resolved.params = params.clone();
            self.registry.validate(&resolved)?;

            step_hosts.push(hosts);
            step_params.push(params);
        }

        let edges = self.collect_edges(&steps);
        check_acyclic(&steps, &edges)?;

        // Task detail: node list -> case list -> case nodes.
        let mut detail = DetailBuilder::new();
        for hosts in step_hosts.iter() {
            for id in hosts {
                if let Some(host) = self.hosts.get(id) {
                    detail.host(host);
                }
            }
        }
        let cases = steps
            .iter()
            .zip(step_params)
            .map(|(step, params)| {
                CaseBundle::new(
                    step.qualified_name(),
                    step.module.clone(),
                    params,
                    step.essential,
                    step.ignore_result,
                )
            })
            .collect();
        let detail = detail.cases(cases).map_hosts(&step_hosts);

        let graph = self.assemble(&steps, &edges, detail);
        info!(
            task = %graph.task_name,
            task_id = %graph.task_id,
            nodes = graph.len(),
            hosts = graph.detail.node_list.len(),
            "built task graph"
        );
        Ok(graph)
    }

    fn job_of(&self, step: &Step) -> Result<&'a Job> {
        self.def.jobs.get(&step.job).ok_or_else(|| {
            OpsflowError::ConfigError(format!("step '{}' has no job", step.qualified_name()))
        })
    }

    /// Expand group names and host ids into catalog host ids, keeping the
    /// first occurrence order. Unknown names are dropped.
    fn resolve_hosts(&self, refs: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for r in refs {
            let ids: Vec<&String> = match self.def.host_groups.get(r) {
                Some(group) => group.iter().collect(),
                None => vec![r],
            };
            for id in ids {
                if !self.hosts.contains(id) {
                    debug!(host = %id, "dropping host not present in catalog");
                    continue;
                }
                if !out.contains(id) {
                    out.push(id.clone());
                }
            }
        }
        out
    }

    /// Replace `params.action` with the catalog content.
    ///
    /// `command` steps get one command per non-empty line; script steps get
    /// `content` plus the action's language as interpreter.
    fn resolve_action(&self, step: &Step) -> Result<Value> {
        let mut params = step.params.clone();
        let Some(map) = params.as_object_mut() else {
            return Ok(params);
        };
        let Some(action_id) = map.get("action").and_then(Value::as_str).map(str::to_string)
        else {
            return Ok(params);
        };

        let action = self
            .actions
            .get(&action_id)
            .ok_or_else(|| OpsflowError::UnknownAction {
                step: step.qualified_name(),
                action: action_id.clone(),
            })?;

        map.remove("action");
        if step.module == "command" {
            let commands = action
                .content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| Value::String(l.to_string()))
                .collect();
            map.insert("commands".into(), Value::Array(commands));
        } else {
            map.insert("content".into(), Value::String(action.content.clone()));
            map.entry("interpreter")
                .or_insert_with(|| Value::String(action.language.clone()));
        }
        debug!(step = %step.qualified_name(), action = %action_id, "resolved action");
        Ok(params)
    }

    /// `(from, to)` pairs by qualified name: step dependencies plus job-level
    /// dependencies (exit steps of the dependency -> entry steps of the job).
    fn collect_edges(&self, steps: &[&Step]) -> BTreeSet<(String, String)> {
        let mut edges = BTreeSet::new();
        for step in steps {
            for dep in step.after.iter() {
                edges.insert((dep.clone(), step.qualified_name()));
            }
        }

        for job in self.def.jobs.values() {
            if job.after.is_empty() {
                continue;
            }
            let entries = entry_steps(job);
            for dep_job in job.after.iter().filter_map(|name| self.def.jobs.get(name)) {
                for exit in exit_steps(dep_job) {
                    for entry in entries.iter() {
                        edges.insert((exit.clone(), entry.clone()));
                    }
                }
            }
        }
        edges
    }

    fn assemble(
        &self,
        steps: &[&Step],
        edges: &BTreeSet<(String, String)>,
        detail: TaskDetail,
    ) -> TaskGraph {
        let task_name = self.def.task_name.clone();
        let mut names: Vec<String> = Vec::with_capacity(steps.len() + 1);
        let root = self
            .def
            .params
            .synthetic_root
            .then(|| synthetic_root_name(&task_name));
        if let Some(ref root) = root {
            names.push(root.clone());
        }
        names.extend(steps.iter().map(|s| s.qualified_name()));

        let index: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
        let mut in_degree: Vec<usize> = vec![0; names.len()];
        for (from, to) in edges {
            if let (Some(&f), Some(&t)) = (index.get(from), index.get(to)) {
                successors[f].push(t);
                in_degree[t] += 1;
            }
        }

        if root.is_some() {
            let entries: Vec<usize> = (1..names.len()).filter(|&i| in_degree[i] == 0).collect();
            for &i in entries.iter() {
                in_degree[i] += 1;
            }
            successors[0] = entries;
        }

        let mut nodes = Vec::with_capacity(names.len());
        let mut succ_iter = successors.into_iter();
        for (i, name) in names.iter().enumerate() {
            let step = detail.case_index(name).and_then(|case| {
                let bundle = detail.case_list.get(case)?;
                Some(StepRef {
                    module: bundle.module.clone(),
                    essential: bundle.essential,
                    ignore_result: bundle.ignore_result,
                    case,
                })
            });
            nodes.push(Arc::new(WorkNode::new(
                name.clone(),
                self.task_id.clone(),
                step,
                succ_iter.next().unwrap_or_default(),
                in_degree[i],
            )));
        }

        TaskGraph {
            task_id: self.task_id.clone(),
            task_name,
            params: self.def.params.clone(),
            detail,
            nodes,
            index,
        }
    }
}

/// Steps of a job with no dependency inside the same job.
fn entry_steps(job: &Job) -> Vec<String> {
    let prefix = format!("{}:", job.name);
    job.steps
        .values()
        .filter(|s| !s.after.iter().any(|d| d.starts_with(&prefix)))
        .map(|s| s.qualified_name())
        .collect()
}

/// Steps of a job that no other step of the same job depends on.
fn exit_steps(job: &Job) -> Vec<String> {
    let depended: BTreeSet<&String> = job.steps.values().flat_map(|s| s.after.iter()).collect();
    job.steps
        .values()
        .map(|s| s.qualified_name())
        .filter(|name| !depended.contains(name))
        .collect()
}

/// Reject cyclic dependency edges.
///
/// Edge direction: dependency -> dependent. A topological sort fails exactly
/// when there is a cycle.
fn check_acyclic(steps: &[&Step], edges: &BTreeSet<(String, String)>) -> Result<()> {
    let names: Vec<String> = steps.iter().map(|s| s.qualified_name()).collect();
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in names.iter() {
        graph.add_node(name.as_str());
    }
    for (from, to) in edges {
        graph.add_edge(from.as_str(), to.as_str(), ());
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(OpsflowError::DagCycle(format!(
            "cycle detected in task graph involving step '{}'",
            cycle.node_id()
        ))),
    }
}
