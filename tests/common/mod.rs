#![allow(dead_code)]

use std::sync::Arc;

use opsflow::config::{ActionCatalog, HostCatalog, ParsedDefinition};
use opsflow::dag::TaskGraph;
use opsflow::plugins::PluginRegistry;
use opsflow::results::TaskReport;
use opsflow_test_utils::FakeExecutor;

pub use opsflow_test_utils::{init_tracing, with_timeout};

/// Build a graph with the builtin registry and an empty action catalog.
pub fn graph(def: &ParsedDefinition, hosts: &HostCatalog) -> TaskGraph {
    opsflow::build_graph(
        def,
        hosts,
        &ActionCatalog::new(),
        &PluginRegistry::builtin(),
        Some("t-1".to_string()),
    )
    .expect("graph should build")
}

/// Run a definition against a fake executor and return the report.
pub async fn run_fake(
    def: &ParsedDefinition,
    hosts: &HostCatalog,
    executor: FakeExecutor,
) -> TaskReport {
    let graph = graph(def, hosts);
    with_timeout(opsflow::execute_graph(graph, Arc::new(executor), None))
        .await
        .expect("run should finish")
}
