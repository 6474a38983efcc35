use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use proptest::prelude::*;

use opsflow::config::ParsedDefinition;
use opsflow::dag::{NodeStatus, Scheduler};
use opsflow::errors::OpsflowError;
use opsflow::results::TaskStatus;
use opsflow_test_utils::builders::{fake_hosts, DefinitionBuilder, JobBuilder, StepBuilder};
use opsflow_test_utils::{ExecEvent, FakeExecutor};

use crate::common::graph;

fn step_name(i: usize) -> String {
    format!("s{i:02}")
}

// Acyclic by construction: step N only depends on steps 0..N-1.
fn dag_strategy(max_steps: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_steps).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, deps)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            deps.into_iter().map(|d| d % i).collect()
                        }
                    })
                    .collect()
            },
        )
    })
}

fn definition_raw(
    deps: &[BTreeSet<usize>],
    hosts: &[String],
    batch_size: usize,
) -> opsflow::config::RawDefinition {
    let refs: Vec<&str> = hosts.iter().map(String::as_str).collect();
    let mut job = JobBuilder::new().hosts(&["all"]);
    for (i, step_deps) in deps.iter().enumerate() {
        let mut step = StepBuilder::echo(&step_name(i));
        for &d in step_deps {
            step = step.after(&step_name(d));
        }
        job = job.step(&step_name(i), step);
    }
    DefinitionBuilder::new()
        .batch_size(batch_size)
        .host_group("all", &refs)
        .job("j", job)
        .raw()
}

fn definition(deps: &[BTreeSet<usize>], hosts: &[String], batch_size: usize) -> ParsedDefinition {
    ParsedDefinition::try_from(definition_raw(deps, hosts, batch_size)).unwrap()
}

fn node(i: usize) -> String {
    format!("j:{}", step_name(i))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_random_dags_run_to_completion(
        deps in dag_strategy(8),
        host_count in 1..5usize,
        batch_size in 1..4usize,
        failing in proptest::collection::vec(0..8usize, 0..3),
    ) {
        let (catalog, ids) = fake_hosts(host_count);
        let def = definition(&deps, &ids, batch_size);
        let failing: HashSet<String> = failing
            .into_iter()
            .filter(|&i| i < deps.len())
            .map(node)
            .collect();

        let mut executor = FakeExecutor::new();
        for name in failing.iter() {
            executor = executor.fail_node(name);
        }

        let graph = Arc::new(graph(&def, &catalog));
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let scheduler = Scheduler::new(Arc::clone(&graph));
        let runtime = opsflow::engine::Runtime::new(scheduler, Arc::new(executor.clone()));
        let report = rt
            .block_on(async {
                tokio::time::timeout(std::time::Duration::from_secs(10), runtime.run()).await
            })
            .expect("run terminates")
            .expect("run succeeds");

        // Every node is terminal and every counter drained to zero.
        prop_assert_eq!(report.progress, 100);
        prop_assert_ne!(report.status, TaskStatus::Running);
        for n in graph.nodes() {
            prop_assert!(n.status().is_terminal(), "{} ended {}", n.name, n.status());
            prop_assert_eq!(n.dependency_account(), 0);
        }

        // Each (node, host) ran at most once.
        let executed = executor.executed();
        let distinct: HashSet<(String, String)> = executed.iter().cloned().collect();
        prop_assert_eq!(distinct.len(), executed.len());

        // A node starts only after every predecessor finished on every host.
        let events = executor.events();
        for (i, step_deps) in deps.iter().enumerate() {
            let me = node(i);
            let Some(first_start) = events.iter().position(
                |e| matches!(e, ExecEvent::Started { node, .. } if *node == me),
            ) else {
                continue;
            };
            for &d in step_deps {
                let dep = node(d);
                let finishes = events.iter().enumerate().filter(
                    |(_, e)| matches!(e, ExecEvent::Finished { node, .. } if *node == dep),
                );
                for (idx, _) in finishes {
                    prop_assert!(idx < first_start, "{} started before {} finished", me, dep);
                }
            }
        }

        // Failures propagate: a non-essential step below a failed node never runs.
        for (i, step_deps) in deps.iter().enumerate() {
            let me = node(i);
            let status = report.node(&me).unwrap().status;
            let blocked = step_deps.iter().any(|&d| {
                report.node(&node(d)).unwrap().status != NodeStatus::Success
            });
            if blocked {
                prop_assert_eq!(status, NodeStatus::Skipped);
            } else if failing.contains(&me) {
                prop_assert_eq!(status, NodeStatus::Failed);
            } else {
                prop_assert_eq!(status, NodeStatus::Success);
            }
        }

        // Batches never exceed the configured size.
        for i in 0..deps.len() {
            prop_assert!(executor.max_in_flight(&node(i)) <= batch_size);
        }
    }

    #[test]
    fn test_back_edge_is_always_rejected(deps in dag_strategy(8)) {
        prop_assume!(deps.len() >= 2);
        let (catalog, ids) = fake_hosts(1);

        // Chain every step to its predecessor, then make the first wait on
        // the last.
        let mut deps = deps;
        let last = deps.len() - 1;
        for i in 1..deps.len() {
            deps[i].insert(i - 1);
        }
        deps[0].insert(last);

        let def = definition(&deps, &ids, 1);
        let result = opsflow::build_graph(
            &def,
            &catalog,
            &opsflow::config::ActionCatalog::new(),
            &opsflow::plugins::PluginRegistry::builtin(),
            None,
        );
        prop_assert!(matches!(result, Err(OpsflowError::DagCycle(_))));
    }
}

