#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use opsflow::config::{
    GlobalParams, HostCatalog, HostDescriptor, ParsedDefinition, RawDefinition, RawJob, RawStep,
    TaskSection,
};
use opsflow::types::EssentialPolicy;
use serde_json::Value;

/// Builder for `ParsedDefinition` to simplify test setup.
pub struct DefinitionBuilder {
    raw: RawDefinition,
}

impl DefinitionBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawDefinition {
                task: TaskSection {
                    name: Some("test".to_string()),
                },
                config: GlobalParams::default(),
                hosts: BTreeMap::new(),
                job: BTreeMap::new(),
            },
        }
    }

    pub fn task_name(mut self, name: &str) -> Self {
        self.raw.task.name = Some(name.to_string());
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.raw.config.batch_size = n;
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.raw.config.timeout = secs;
        self
    }

    pub fn essential_policy(mut self, policy: EssentialPolicy) -> Self {
        self.raw.config.essential_policy = policy;
        self
    }

    pub fn synthetic_root(mut self, val: bool) -> Self {
        self.raw.config.synthetic_root = val;
        self
    }

    pub fn result_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw.config.result_dir = dir.into();
        self
    }

    pub fn host_group(mut self, name: &str, ids: &[&str]) -> Self {
        self.raw
            .hosts
            .insert(name.to_string(), ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn job(mut self, name: &str, job: JobBuilder) -> Self {
        self.raw.job.insert(name.to_string(), job.build());
        self
    }

    pub fn raw(self) -> RawDefinition {
        self.raw
    }

    pub fn build(self) -> ParsedDefinition {
        ParsedDefinition::try_from(self.raw).expect("Failed to build valid definition from builder")
    }
}

impl Default for DefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawJob`.
pub struct JobBuilder {
    job: RawJob,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            job: RawJob::default(),
        }
    }

    pub fn hosts(mut self, refs: &[&str]) -> Self {
        self.job.hosts.extend(refs.iter().map(|s| s.to_string()));
        self
    }

    pub fn after(mut self, job: &str) -> Self {
        self.job.after.push(job.to_string());
        self
    }

    pub fn step(mut self, name: &str, step: StepBuilder) -> Self {
        self.job.step.insert(name.to_string(), step.build());
        self
    }

    pub fn build(self) -> RawJob {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawStep`.
pub struct StepBuilder {
    step: RawStep,
}

impl StepBuilder {
    pub fn new(module: &str) -> Self {
        Self {
            step: RawStep {
                module: module.to_string(),
                hosts: vec![],
                after: vec![],
                essential: false,
                ignore_result: false,
                params: serde_json::Map::new(),
            },
        }
    }

    /// A `command` step running `echo <text>`.
    pub fn echo(text: &str) -> Self {
        Self::new("command").param("commands", vec![format!("echo {text}")])
    }

    pub fn hosts(mut self, refs: &[&str]) -> Self {
        self.step.hosts.extend(refs.iter().map(|s| s.to_string()));
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.step.after.push(dep.to_string());
        self
    }

    pub fn essential(mut self, val: bool) -> Self {
        self.step.essential = val;
        self
    }

    pub fn ignore_result(mut self, val: bool) -> Self {
        self.step.ignore_result = val;
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.step.params.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> RawStep {
        self.step
    }
}

/// Catalog of `n` local-mode hosts `host-01..` with distinct fake ips.
///
/// Returns the catalog and the host ids in order.
pub fn fake_hosts(n: usize) -> (HostCatalog, Vec<String>) {
    let mut catalog = HostCatalog::new();
    let mut ids = Vec::with_capacity(n);
    for i in 1..=n {
        let id = format!("host-{i:02}");
        let mut host = HostDescriptor::local(&id);
        host.ip = format!("10.0.0.{i}");
        catalog.insert(host);
        ids.push(id);
    }
    (catalog, ids)
}

/// Catalog of local-mode hosts that really run on this machine.
pub fn local_hosts(ids: &[&str]) -> HostCatalog {
    let mut catalog = HostCatalog::new();
    for id in ids {
        catalog.insert(HostDescriptor::local(*id));
    }
    catalog
}
