// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::EssentialPolicy;

/// Raw task definition as read from a TOML file.
///
/// ```toml
/// [task]
/// name = "deploy"
///
/// [config]
/// batch_size = 5
/// timeout = 900
///
/// [hosts]
/// web = ["web-1", "web-2"]
///
/// [job.build]
/// hosts = ["web"]
///
/// [job.build.step.upload]
/// module = "copy"
/// params = { src = "dist/app.tar.gz", dest = "~/app.tar.gz" }
///
/// [job.build.step.restart]
/// module = "command"
/// after = ["upload"]
/// params = { commands = ["systemctl restart app"] }
/// ```
///
/// Nothing here has been checked yet; see [`ParsedDefinition`] for the
/// validated form.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RawDefinition {
    #[serde(default)]
    pub task: TaskSection,

    /// Global parameters from `[config]`.
    #[serde(default)]
    pub config: GlobalParams,

    /// Host groups: group name -> host ids.
    #[serde(default)]
    pub hosts: BTreeMap<String, Vec<String>>,

    /// All jobs from `[job.<name>]`.
    #[serde(default)]
    pub job: BTreeMap<String, RawJob>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TaskSection {
    #[serde(default)]
    pub name: Option<String>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GlobalParams {
    /// Hosts per concurrent batch within one node.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per host execution timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub essential_policy: EssentialPolicy,

    /// Whether to add a placeholder root node that every entry node hangs off.
    #[serde(default = "default_synthetic_root")]
    pub synthetic_root: bool,

    /// Controller-local directory for per-host result logs.
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,
}

fn default_batch_size() -> usize {
    5
}

fn default_timeout() -> u64 {
    900
}

fn default_synthetic_root() -> bool {
    true
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout: default_timeout(),
            essential_policy: EssentialPolicy::default(),
            synthetic_root: default_synthetic_root(),
            result_dir: default_result_dir(),
        }
    }
}

/// `[job.<name>]` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RawJob {
    /// Host group names or host ids.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Jobs that must finish before any step of this job starts.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub step: BTreeMap<String, RawStep>,
}

/// `[job.<name>.step.<name>]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawStep {
    /// Plugin name, e.g. `"copy"` or `"script"`.
    pub module: String,

    /// Subset of the job's hosts; empty means all of them.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// `"step"` (same job) or `"job:step"` tokens.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub essential: bool,

    #[serde(default)]
    pub ignore_result: bool,

    /// Module parameters, handed to the plugin as JSON.
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

/// Validated job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub name: String,
    /// Host group names or host ids, resolved at graph build time.
    pub hosts: Vec<String>,
    pub after: Vec<String>,
    pub steps: BTreeMap<String, Step>,
}

/// Validated step. Dependencies are fully qualified (`job:step`).
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub job: String,
    pub name: String,
    pub module: String,
    /// Host references narrowing the job's hosts; empty means all of them.
    pub hosts: Vec<String>,
    pub after: Vec<String>,
    pub essential: bool,
    pub ignore_result: bool,
    pub params: Value,
}

impl Step {
    /// `job:step`, the name of this step's work node.
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.job, &self.name)
    }
}

pub fn qualified_name(job: &str, step: &str) -> String {
    format!("{job}:{step}")
}

/// Output of the definition parser: `(jobs, task_name, global_params, hosts)`.
#[derive(Debug, Clone)]
pub struct ParsedDefinition {
    pub task_name: String,
    pub params: GlobalParams,
    pub host_groups: BTreeMap<String, Vec<String>>,
    pub jobs: BTreeMap<String, Job>,
}

impl ParsedDefinition {
    pub fn step(&self, qualified: &str) -> Option<&Step> {
        let (job, step) = qualified.split_once(':')?;
        self.jobs.get(job)?.steps.get(step)
    }

    /// All steps in job order, then step order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.jobs.values().flat_map(|job| job.steps.values())
    }

    pub fn step_count(&self) -> usize {
        self.jobs.values().map(|job| job.steps.len()).sum()
    }
}
