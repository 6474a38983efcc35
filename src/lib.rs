// src/lib.rs

pub mod atomic;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod plugins;
pub mod remote;
pub mod results;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, ActionCatalog, HostCatalog, ParsedDefinition};
use crate::crypto::Cipher;
use crate::dag::{GraphBuilder, Scheduler, TaskGraph};
use crate::engine::Runtime;
use crate::exec::{ExecutorBackend, RemoteExecutor};
use crate::plugins::PluginRegistry;
use crate::remote::{DefaultConnector, SshConnector};
use crate::results::{StatusSink, TaskReport, TaskStatus};

/// Build the task graph for a parsed definition.
///
/// Fails before anything runs if a step names an unknown module or action,
/// has invalid parameters, or the dependencies form a cycle.
pub fn build_graph(
    def: &ParsedDefinition,
    hosts: &HostCatalog,
    actions: &ActionCatalog,
    registry: &PluginRegistry,
    task_id: Option<String>,
) -> errors::Result<TaskGraph> {
    let builder = GraphBuilder::new(def, hosts, actions, registry);
    match task_id {
        Some(id) => builder.task_id(id).build(),
        None => builder.build(),
    }
}

/// Run a built graph to completion and return the final report.
pub async fn execute_graph<E>(
    graph: TaskGraph,
    executor: Arc<E>,
    sink: Option<Arc<dyn StatusSink>>,
) -> errors::Result<TaskReport>
where
    E: ExecutorBackend + 'static,
{
    let scheduler = Scheduler::new(Arc::new(graph));
    let mut runtime = Runtime::new(scheduler, executor);
    if let Some(sink) = sink {
        runtime = runtime.with_sink(sink);
    }
    runtime.run().await
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - definition and catalog loading
/// - graph build (validation, host resolution, task detail)
/// - the runtime with the remote executor
///
/// Returns `None` when nothing was executed (`--dry-run`, `--encrypt`).
pub async fn run(args: CliArgs) -> Result<Option<TaskStatus>> {
    if let Some(ref plaintext) = args.encrypt {
        let cipher = Cipher::from_env().with_context(|| {
            format!("{} must be set to encrypt credentials", crypto::SECRET_KEY_ENV)
        })?;
        println!("{}", cipher.seal(plaintext)?);
        return Ok(None);
    }

    let mut def = load_and_validate(&args.definition)?;
    if let Some(ref dir) = args.result_dir {
        def.params.result_dir = dir.clone();
    }

    let cipher = Cipher::from_env();
    let hosts = match args.hosts {
        Some(ref path) => HostCatalog::load(path, cipher.as_ref())?,
        None => HostCatalog::new(),
    };
    let actions = match args.actions {
        Some(ref path) => ActionCatalog::load(path)?,
        None => ActionCatalog::new(),
    };

    let registry = PluginRegistry::builtin();
    let graph = build_graph(&def, &hosts, &actions, &registry, args.task_id.clone())?;

    if args.dry_run {
        print_dry_run(&graph)?;
        return Ok(None);
    }

    let ssh = SshConnector::default().with_exec_timeout(Duration::from_secs(graph.params.timeout));
    let executor = Arc::new(RemoteExecutor::new(DefaultConnector::new(ssh), registry));
    let report = execute_graph(graph, executor, None).await?;

    println!("{}", report.to_json()?);
    info!(task_id = %report.task_id, status = %report.status, "task finished");
    Ok(Some(report.status))
}

/// Dry-run output: nodes, their dependencies and hosts, then the task detail.
fn print_dry_run(graph: &TaskGraph) -> Result<()> {
    println!("opsflow dry-run");
    println!("  task = {} ({})", graph.task_name, graph.task_id);
    println!("  config.batch_size = {}", graph.params.batch_size);
    println!("  config.timeout = {}s", graph.params.timeout);
    println!(
        "  config.essential_policy = {:?}",
        graph.params.essential_policy
    );
    println!();

    println!("nodes ({}):", graph.len());
    for node in graph.nodes() {
        println!("  - {}", node.name);
        let deps = graph.predecessors_of(&node.name);
        if !deps.is_empty() {
            println!("      after: {:?}", deps);
        }
        match node.step {
            Some(ref step) => {
                println!("      module: {}", step.module);
                let hosts: Vec<String> = graph
                    .detail
                    .hosts_for(step.case)
                    .into_iter()
                    .map(|h| h.id)
                    .collect();
                println!("      hosts: {:?}", hosts);
                if step.essential {
                    println!("      essential: true");
                }
                if step.ignore_result {
                    println!("      ignore_result: true");
                }
            }
            None => println!("      synthetic"),
        }
    }
    println!();
    println!("{}", graph.detail.to_json()?);

    debug!("dry-run complete (no execution)");
    Ok(())
}
