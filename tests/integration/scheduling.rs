// tests/integration/scheduling.rs

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use opsflow::dag::{synthetic_root_name, Dispatch, NodeStatus, Scheduler};
use opsflow::plugins::{PluginResult, ResultCode};
use opsflow::results::{StatusSink, TaskStatus};
use opsflow_test_utils::builders::{fake_hosts, DefinitionBuilder, JobBuilder, StepBuilder};
use opsflow_test_utils::{ExecEvent, FakeExecutor};

use crate::common::{graph, init_tracing, run_fake, with_timeout};

/// a -> (b, c) -> d, all on two hosts.
fn diamond() -> opsflow::config::ParsedDefinition {
    DefinitionBuilder::new()
        .host_group("all", &["host-01", "host-02"])
        .job(
            "j",
            JobBuilder::new()
                .hosts(&["all"])
                .step("a", StepBuilder::echo("a"))
                .step("b", StepBuilder::echo("b").after("a"))
                .step("c", StepBuilder::echo("c").after("a"))
                .step("d", StepBuilder::echo("d").after("b").after("c")),
        )
        .build()
}

fn position(events: &[ExecEvent], wanted: impl Fn(&ExecEvent) -> bool) -> Vec<usize> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| wanted(e))
        .map(|(i, _)| i)
        .collect()
}

fn started(node: &'static str) -> impl Fn(&ExecEvent) -> bool {
    move |e| matches!(e, ExecEvent::Started { node: n, .. } if n == node)
}

fn finished(node: &'static str) -> impl Fn(&ExecEvent) -> bool {
    move |e| matches!(e, ExecEvent::Finished { node: n, .. } if n == node)
}

#[tokio::test]
async fn test_diamond_runs_in_dependency_order() {
    init_tracing();
    let (hosts, _) = fake_hosts(2);
    let executor = FakeExecutor::new()
        .with_delay(Duration::from_millis(10))
        .node_delay("j:b", Duration::from_millis(150))
        .node_delay("j:c", Duration::from_millis(50));

    let report = run_fake(&diamond(), &hosts, executor.clone()).await;

    assert_eq!(report.status, TaskStatus::Success);
    assert_eq!(report.progress, 100);
    assert_eq!(executor.executed_nodes(), vec!["j:a", "j:b", "j:c", "j:d"]);

    let events = executor.events();
    let last_a_finish = *position(&events, finished("j:a")).last().unwrap();
    let first_b_start = position(&events, started("j:b"))[0];
    let first_c_start = position(&events, started("j:c"))[0];
    assert!(first_b_start > last_a_finish);
    assert!(first_c_start > last_a_finish);

    // b and c are released together and overlap.
    let first_c_finish = position(&events, finished("j:c"))[0];
    let starts_b = position(&events, started("j:b"));
    let starts_c = position(&events, started("j:c"));
    assert!(starts_b.iter().chain(starts_c.iter()).all(|&i| i < first_c_finish));

    let first_d_start = position(&events, started("j:d"))[0];
    let last_b_finish = *position(&events, finished("j:b")).last().unwrap();
    let last_c_finish = *position(&events, finished("j:c")).last().unwrap();
    assert!(first_d_start > last_b_finish);
    assert!(first_d_start > last_c_finish);
}

#[tokio::test]
async fn test_every_node_and_host_is_reported() {
    let (hosts, _) = fake_hosts(2);
    let executor = FakeExecutor::new();

    let report = run_fake(&diamond(), &hosts, executor.clone()).await;

    assert_eq!(report.nodes.len(), 5);
    assert!(report.nodes.iter().all(|n| n.status == NodeStatus::Success));
    assert_eq!(report.results.len(), 4 * 2, "one result per step and host");
    assert!(report.results.iter().all(|r| r.result.is_success()));

    let root = synthetic_root_name("test");
    assert_eq!(report.results_for(&root).count(), 0);
    assert_eq!(report.results_for("j:d").count(), 2);
    assert_eq!(executor.executed().len(), 8);
}

#[tokio::test]
async fn test_each_node_is_dispatched_once() {
    let (hosts, _) = fake_hosts(3);
    let def = DefinitionBuilder::new()
        .host_group("all", &["host-01", "host-02", "host-03"])
        .job(
            "j",
            JobBuilder::new()
                .hosts(&["all"])
                .step("a", StepBuilder::echo("a"))
                .step("b", StepBuilder::echo("b"))
                .step("c", StepBuilder::echo("c"))
                .step("join", StepBuilder::echo("join").after("a").after("b").after("c")),
        )
        .build();
    let executor = FakeExecutor::new().with_delay(Duration::from_millis(5));

    let report = run_fake(&def, &hosts, executor.clone()).await;

    assert_eq!(report.status, TaskStatus::Success);
    let join_runs = executor
        .executed()
        .into_iter()
        .filter(|(node, _)| node == "j:join")
        .count();
    assert_eq!(join_runs, 3, "join runs once per host, never twice");
}

#[tokio::test]
async fn test_step_without_hosts_succeeds_without_executing() {
    let (hosts, _) = fake_hosts(1);
    let def = DefinitionBuilder::new()
        .job(
            "j",
            JobBuilder::new()
                .hosts(&["host-01"])
                .step("nowhere", StepBuilder::echo("x").hosts(&["ghost"]))
                .step("after", StepBuilder::echo("y").after("nowhere")),
        )
        .build();
    let executor = FakeExecutor::new();

    let report = run_fake(&def, &hosts, executor.clone()).await;

    assert_eq!(report.status, TaskStatus::Success);
    assert_eq!(report.node("j:nowhere").unwrap().status, NodeStatus::Success);
    assert_eq!(executor.executed_nodes(), vec!["j:after"]);
}

#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<(TaskStatus, u8)>>,
}

impl StatusSink for RecordingSink {
    fn update(&self, _task_id: &str, status: TaskStatus, progress: u8) {
        self.updates.lock().push((status, progress));
    }
}

#[tokio::test]
async fn test_progress_is_reported_to_the_sink() {
    let (hosts, _) = fake_hosts(1);
    let def = DefinitionBuilder::new()
        .job(
            "j",
            JobBuilder::new()
                .hosts(&["host-01"])
                .step("a", StepBuilder::echo("a"))
                .step("b", StepBuilder::echo("b").after("a"))
                .step("c", StepBuilder::echo("c").after("b")),
        )
        .build();
    let sink = Arc::new(RecordingSink::default());

    let report = with_timeout(opsflow::execute_graph(
        graph(&def, &hosts),
        Arc::new(FakeExecutor::new()),
        Some(sink.clone() as Arc<dyn StatusSink>),
    ))
    .await
    .unwrap();

    assert_eq!(report.status, TaskStatus::Success);
    let updates = sink.updates.lock().clone();
    assert_eq!(updates.first(), Some(&(TaskStatus::Running, 0)));
    assert_eq!(updates.last(), Some(&(TaskStatus::Success, 100)));
    assert_eq!(updates.len(), 1 + 4, "initial update plus one per node");

    let progress: Vec<u8> = updates.iter().map(|(_, p)| *p).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(updates[..updates.len() - 1]
        .iter()
        .all(|(s, _)| *s == TaskStatus::Running));
}

#[test]
fn test_scheduler_transitions_only_move_forward() {
    let (hosts, _) = fake_hosts(1);
    let graph = Arc::new(graph(&diamond(), &hosts));
    let scheduler = Scheduler::new(Arc::clone(&graph));

    let roots = scheduler.start();
    assert_eq!(roots, vec![0]);
    assert_eq!(graph.node(0).unwrap().status(), NodeStatus::Ready);

    let a = graph.index_of("j:a").unwrap();
    assert!(matches!(scheduler.begin(a), Dispatch::Ignore), "a is still waiting");

    assert!(matches!(scheduler.begin(0), Dispatch::Synthetic));
    assert!(matches!(scheduler.begin(0), Dispatch::Ignore), "already running");

    let step = scheduler.complete(0, &[]);
    assert_eq!(step.status, NodeStatus::Success);
    assert!(step.pushed_success);
    assert_eq!(step.released, vec![a]);

    let repeat = scheduler.complete(0, &[]);
    assert!(repeat.released.is_empty(), "a repeated completion releases nothing");

    match scheduler.begin(a) {
        Dispatch::Run { hosts, module, .. } => {
            assert_eq!(module, "command");
            assert_eq!(hosts.len(), 1);
        }
        other => panic!("Expected Run, got: {:?}", other),
    }
    assert_eq!(graph.node(a).unwrap().status(), NodeStatus::Running);

    let step = scheduler.complete(a, &[PluginResult::success("ok")]);
    let mut released: Vec<&str> = step
        .released
        .iter()
        .map(|&i| graph.node(i).unwrap().name.as_str())
        .collect();
    released.sort();
    assert_eq!(released, vec!["j:b", "j:c"]);

    let node_a = graph.node(a).unwrap();
    assert!(!node_a.advance(NodeStatus::Running));
    assert!(!node_a.advance(NodeStatus::Failed), "terminal states are final");
    assert_eq!(node_a.status(), NodeStatus::Success);

    let b = graph.index_of("j:b").unwrap();
    let c = graph.index_of("j:c").unwrap();
    let d = graph.index_of("j:d").unwrap();
    scheduler.begin(b);
    scheduler.begin(c);
    assert!(scheduler.complete(b, &[PluginResult::success("")]).released.is_empty());
    assert_eq!(graph.node(d).unwrap().dependency_account(), 1);
    assert_eq!(
        scheduler.complete(c, &[PluginResult::success("")]).released,
        vec![d]
    );
    assert_eq!(graph.node(d).unwrap().dependency_account(), 0);

    scheduler.begin(d);
    scheduler.complete(d, &[PluginResult::failure(ResultCode::Failed, "boom")]);
    assert!(scheduler.all_terminal());
    assert_eq!(graph.node(d).unwrap().status(), NodeStatus::Failed);
}
