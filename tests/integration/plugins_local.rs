// tests/integration/plugins_local.rs

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use opsflow::config::{HostDescriptor, ParsedDefinition};
use opsflow::crypto::compute_bytes_hash;
use opsflow::exec::{ExecutorBackend, HostJob, RemoteExecutor};
use opsflow::plugins::fetch::reserve_local_path;
use opsflow::plugins::ping::packet_loss;
use opsflow::plugins::{
    CommandPlugin, CopyPlugin, ExecutionMeta, FetchPlugin, PingPlugin, Plugin, PluginContext,
    PluginError, PluginRegistry, PluginResult, ResultCode,
};
use opsflow::remote::{Channels, Connector, LocalConnector, SshConnector};
use opsflow::results::{LogKind, ResultLog, ResultLookup, TaskStatus};
use opsflow::types::ConnectionMode;
use opsflow_test_utils::builders::{local_hosts, DefinitionBuilder, JobBuilder, StepBuilder};

use crate::common::{graph, init_tracing, with_timeout};

struct Fixture {
    dir: TempDir,
    host: HostDescriptor,
    meta: ExecutionMeta,
    channels: Channels,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let host = HostDescriptor::local("local");
        let meta = ExecutionMeta {
            task_id: "t-1".to_string(),
            node_name: "j:step".to_string(),
            result_dir: dir.path().join("results"),
        };
        let channels = LocalConnector.open(&host).await.unwrap();
        Self {
            dir,
            host,
            meta,
            channels,
        }
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join(rel)
    }

    fn ctx(&self) -> PluginContext<'_> {
        PluginContext::new(&self.host, &self.meta, Some(&self.channels))
    }

    fn log(&self) -> ResultLog {
        ResultLog::new(&self.meta.result_dir)
    }
}

fn copy(src: &Path, dest: &Path) -> CopyPlugin {
    CopyPlugin::from_params(&json!({
        "src": src.to_str().unwrap(),
        "dest": dest.to_str().unwrap(),
    }))
    .unwrap()
}

fn fetch(src: &Path, dest: &Path) -> FetchPlugin {
    FetchPlugin::from_params(&json!({
        "src": src.to_str().unwrap(),
        "dest": dest.to_str().unwrap(),
    }))
    .unwrap()
}

#[tokio::test]
async fn test_copy_then_fetch_round_trips_bytes() {
    init_tracing();
    let fx = Fixture::new().await;
    let bytes: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let local = fx.path("artifact.bin");
    std::fs::write(&local, &bytes).unwrap();

    let remote = fx.path("remote/nested/artifact.bin");
    let result = copy(&local, &remote).run(&fx.ctx()).await.unwrap();
    assert!(result.is_success());
    assert_eq!(std::fs::read(&remote).unwrap(), bytes);

    let back = fx.path("back");
    let result = fetch(&remote, &back).run(&fx.ctx()).await.unwrap();
    let fetched = back.join("127.0.0.1_artifact.bin");
    assert_eq!(result.error_msg, fetched.display().to_string());

    let fetched_bytes = std::fs::read(&fetched).unwrap();
    assert_eq!(compute_bytes_hash(&fetched_bytes), compute_bytes_hash(&bytes));
}

#[tokio::test]
async fn test_copy_into_existing_directory_keeps_the_name() {
    let fx = Fixture::new().await;
    let local = fx.path("app.conf");
    std::fs::write(&local, "port = 80\n").unwrap();
    let target = fx.path("etc");
    std::fs::create_dir(&target).unwrap();

    copy(&local, &target).run(&fx.ctx()).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(target.join("app.conf")).unwrap(),
        "port = 80\n"
    );
}

#[tokio::test]
async fn test_copy_replaces_existing_file() {
    let fx = Fixture::new().await;
    let local = fx.path("new.txt");
    std::fs::write(&local, "new").unwrap();
    let remote = fx.path("current.txt");
    std::fs::write(&remote, "old contents that are longer").unwrap();

    copy(&local, &remote).run(&fx.ctx()).await.unwrap();

    assert_eq!(std::fs::read_to_string(&remote).unwrap(), "new");
}

#[tokio::test]
async fn test_copy_rejects_missing_and_directory_sources() {
    let fx = Fixture::new().await;

    let err = copy(&fx.path("missing.txt"), &fx.path("out.txt"))
        .run(&fx.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::LocalPathMissing(_)), "got {err:?}");
    assert_eq!(err.code(), ResultCode::LocalPathMissing);

    let err = copy(fx.dir.path(), &fx.path("out.txt"))
        .run(&fx.ctx())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::PathIsDirectory);
}

#[tokio::test]
async fn test_fetch_never_overwrites_by_default() {
    let fx = Fixture::new().await;
    let remote = fx.path("data.csv");
    std::fs::write(&remote, "a,b\n").unwrap();
    let dest = fx.path("collected");

    fetch(&remote, &dest).run(&fx.ctx()).await.unwrap();
    fetch(&remote, &dest).run(&fx.ctx()).await.unwrap();

    assert!(dest.join("127.0.0.1_data.csv").exists());
    assert!(dest.join("127.0.0.1_data.csv(1)").exists());

    let next = reserve_local_path(&dest, "127.0.0.1_data.csv").await.unwrap();
    assert_eq!(next, dest.join("127.0.0.1_data.csv(2)"));
    assert!(next.exists(), "the reserved name is claimed on disk");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_never_share_a_file() {
    let fx = Fixture::new().await;
    let remote = fx.path("out.csv");
    std::fs::write(&remote, "rows\n").unwrap();
    let web1 = HostDescriptor::local("web-1");
    let web2 = HostDescriptor::local("web-2");

    for round in 0..50 {
        let dest = fx.path(&format!("round-{round}"));
        let plugin = FetchPlugin::from_params(&json!({
            "src": remote.to_str().unwrap(),
            "dest": dest.to_str().unwrap(),
            "filename": "out.csv",
        }))
        .unwrap();
        let ctx1 = PluginContext::new(&web1, &fx.meta, Some(&fx.channels));
        let ctx2 = PluginContext::new(&web2, &fx.meta, Some(&fx.channels));

        let (a, b) = tokio::join!(plugin.run(&ctx1), plugin.run(&ctx2));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.error_msg, b.error_msg, "round {round}: both hosts got one path");
        let mut names: Vec<String> = std::fs::read_dir(&dest)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["out.csv", "out.csv(1)"], "round {round}");
        for name in &names {
            assert_eq!(std::fs::read_to_string(dest.join(name)).unwrap(), "rows\n");
        }
    }
}

#[tokio::test]
async fn test_fetch_overwrite_and_filename() {
    let fx = Fixture::new().await;
    let remote = fx.path("data.csv");
    std::fs::write(&remote, "v1").unwrap();
    let dest = fx.path("collected");

    let plugin = FetchPlugin::from_params(&json!({
        "src": remote.to_str().unwrap(),
        "dest": dest.to_str().unwrap(),
        "filename": "latest.csv",
        "overwrite": true,
    }))
    .unwrap();

    plugin.run(&fx.ctx()).await.unwrap();
    std::fs::write(&remote, "v2").unwrap();
    plugin.run(&fx.ctx()).await.unwrap();

    assert_eq!(std::fs::read_to_string(dest.join("latest.csv")).unwrap(), "v2");
    assert!(!dest.join("latest.csv(1)").exists());
}

#[tokio::test]
async fn test_fetch_reports_missing_and_directory_sources() {
    let fx = Fixture::new().await;
    let dest = fx.path("collected");

    let err = fetch(&fx.path("nope.log"), &dest)
        .run(&fx.ctx())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::RemotePathMissing);

    let err = fetch(fx.dir.path(), &dest).run(&fx.ctx()).await.unwrap_err();
    assert_eq!(err.code(), ResultCode::PathIsDirectory);
}

#[test]
fn test_fetch_rejects_path_like_filename() {
    let err = FetchPlugin::from_params(&json!({
        "src": "/var/log/syslog",
        "dest": "/tmp",
        "filename": "../escape",
    }))
    .unwrap_err();
    assert!(matches!(err, PluginError::InvalidParams(_)));
}

#[tokio::test]
async fn test_command_stops_at_first_failure() {
    let fx = Fixture::new().await;
    let plugin = CommandPlugin::new(vec![
        "echo one".to_string(),
        "false".to_string(),
        "echo three".to_string(),
    ]);

    let err = plugin.run(&fx.ctx()).await.unwrap_err();
    match err {
        PluginError::NonZeroExit { status, ref output } => {
            assert_eq!(status, 1);
            assert!(output.contains("one"));
            assert!(!output.contains("three"));
        }
        ref other => panic!("Expected NonZeroExit, got: {:?}", other),
    }

    let lookup = fx
        .log()
        .lookup("t-1", LogKind::Command, "127.0.0.1", false)
        .await
        .unwrap();
    match lookup {
        ResultLookup::Found(text) => {
            assert!(text.contains("node=j:step exit=1"));
            assert!(text.contains("$ echo one"));
            assert!(text.contains("$ false"));
            assert!(!text.contains("three"));
        }
        other => panic!("Expected Found, got: {:?}", other),
    }
}

#[test]
fn test_command_requires_commands() {
    assert!(CommandPlugin::from_params(&json!({ "commands": [] })).is_err());
    assert!(CommandPlugin::from_params(&json!({ "commands": ["  "] })).is_err());
    assert!(CommandPlugin::from_params(&json!({ "commands": ["uptime"], "extra": 1 })).is_err());
}

#[tokio::test]
async fn test_ping_unreachable_address_fails() {
    let fx = Fixture::new().await;
    let plugin = PingPlugin::from_params(&json!({
        "count": 1,
        "timeout": 1,
        "target": "192.0.2.1",
    }))
    .unwrap();
    assert!(!plugin.needs_connection());

    let result: PluginResult = match plugin.run(&fx.ctx()).await {
        Ok(result) => result,
        Err(err) => err.into(),
    };
    assert!(!result.is_success());
}

#[tokio::test]
#[ignore = "needs a ping binary and ICMP permissions"]
async fn test_ping_loopback_succeeds() {
    let fx = Fixture::new().await;
    let plugin = PingPlugin::from_params(&json!({ "count": 1 })).unwrap();

    let result = plugin.run(&fx.ctx()).await.unwrap();
    assert!(result.is_success());
}

#[test]
fn test_packet_loss_parsing() {
    let linux = "3 packets transmitted, 3 received, 0% packet loss, time 2003ms";
    assert_eq!(packet_loss(linux), Some(0.0));

    let busybox = "2 packets transmitted, 1 packets received, 50% packet loss";
    assert_eq!(packet_loss(busybox), Some(50.0));

    let bsd = "1 packets transmitted, 0 packets received, 100.0% packet loss";
    assert_eq!(packet_loss(bsd), Some(100.0));

    assert_eq!(packet_loss("ping: unknown host"), None);
}

#[test]
fn test_packet_loss_from_many_threads() {
    let handles: Vec<_> = (0..4u32)
        .map(|loss| {
            std::thread::spawn(move || {
                (0..250)
                    .map(|n| format!("{n} packets transmitted, {loss}% packet loss"))
                    .filter(|line| packet_loss(line) == Some(f64::from(loss)))
                    .count()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 250);
    }
}

fn local_definition(result_dir: &Path, step: StepBuilder) -> ParsedDefinition {
    DefinitionBuilder::new()
        .result_dir(result_dir)
        .job(
            "j",
            JobBuilder::new().hosts(&["local"]).step("run", step),
        )
        .build()
}

#[tokio::test]
async fn test_script_runs_and_writes_result_log() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results");
    let hosts = local_hosts(&["local"]);
    let def = local_definition(
        &results,
        StepBuilder::new("script")
            .param("content", "echo \"hello $1\"\npwd\n")
            .param("args", json!(["from-script"])),
    );
    let executor = Arc::new(RemoteExecutor::new(LocalConnector, PluginRegistry::builtin()));

    let report = with_timeout(opsflow::execute_graph(graph(&def, &hosts), executor, None))
        .await
        .unwrap();

    assert_eq!(report.status, TaskStatus::Success);
    let result = report.results_for("j:run").next().unwrap();
    assert!(result.result.error_msg.contains("hello from-script"));
    assert!(result.result.error_msg.contains("/tmp/opsflow_"));

    let log = ResultLog::new(&results);
    match log.lookup("t-1", LogKind::Script, "127.0.0.1", false).await.unwrap() {
        ResultLookup::Found(text) => {
            assert!(text.contains("node=j:run exit=0"));
            assert!(text.contains("hello from-script"));
        }
        other => panic!("Expected Found, got: {:?}", other),
    }

    // The working directory is removed after the run.
    let workdir = result
        .result
        .error_msg
        .lines()
        .find(|l| l.starts_with("/tmp/opsflow_"))
        .unwrap();
    assert!(!Path::new(workdir).exists());
}

#[tokio::test]
async fn test_shell_module_does_not_log() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results");
    let hosts = local_hosts(&["local"]);
    let def = local_definition(
        &results,
        StepBuilder::new("shell").param("content", "exit 3"),
    );
    let executor = Arc::new(RemoteExecutor::new(LocalConnector, PluginRegistry::builtin()));

    let report = with_timeout(opsflow::execute_graph(graph(&def, &hosts), executor, None))
        .await
        .unwrap();

    assert_eq!(report.status, TaskStatus::Failed);
    let result = report.results_for("j:run").next().unwrap();
    assert_eq!(result.result.error_code, ResultCode::NonZeroExit);
    assert!(result.result.error_msg.contains("status 3"));

    let lookup = ResultLog::new(&results)
        .lookup("t-1", LogKind::Script, "127.0.0.1", false)
        .await
        .unwrap();
    assert_eq!(lookup, ResultLookup::NotFound);
}

#[tokio::test]
async fn test_connection_failure_is_a_result() {
    let executor = RemoteExecutor::with_defaults();
    let mut host = HostDescriptor::local("down");
    host.mode = ConnectionMode::Password;
    host.port = 1;
    host.password = Some("secret".to_string());

    let result = executor
        .execute(HostJob {
            host,
            module: "command".to_string(),
            params: json!({ "commands": ["true"] }),
            meta: ExecutionMeta {
                task_id: "t-1".to_string(),
                node_name: "j:step".to_string(),
                result_dir: std::env::temp_dir(),
            },
        })
        .await;

    assert_eq!(result.error_code, ResultCode::ConnectionFailed);
}

#[test]
fn test_ssh_session_timeout_never_undercuts_task_timeout() {
    let task_timeout = Duration::from_secs(900);

    let connector = SshConnector::default();
    assert_eq!(connector.connect_timeout_ms(), 30_000);
    assert_eq!(connector.session_timeout_ms(), 0, "unbounded once connected");

    let connector = SshConnector::new(Duration::from_secs(5)).with_exec_timeout(task_timeout);
    assert_eq!(connector.connect_timeout_ms(), 5_000);
    assert!(u128::from(connector.session_timeout_ms()) >= task_timeout.as_millis());
}

struct PanickingPlugin;

#[async_trait]
impl Plugin for PanickingPlugin {
    fn name(&self) -> &str {
        "boom"
    }

    fn needs_connection(&self) -> bool {
        false
    }

    async fn run(&self, _ctx: &PluginContext<'_>) -> Result<PluginResult, PluginError> {
        panic!("plugin bug");
    }
}

fn build_panicking(_params: &Value) -> Result<Box<dyn Plugin>, PluginError> {
    Ok(Box::new(PanickingPlugin))
}

fn build_exploding(_params: &Value) -> Result<Box<dyn Plugin>, PluginError> {
    panic!("constructor bug");
}

fn job(module: &str) -> HostJob {
    HostJob {
        host: HostDescriptor::local("local"),
        module: module.to_string(),
        params: json!({}),
        meta: ExecutionMeta {
            task_id: "t-1".to_string(),
            node_name: "j:step".to_string(),
            result_dir: std::env::temp_dir(),
        },
    }
}

#[tokio::test]
async fn test_panicking_plugin_becomes_failure() {
    let mut registry = PluginRegistry::builtin();
    registry.register("boom", build_panicking);
    let executor = RemoteExecutor::new(LocalConnector, registry);

    let result = executor.execute(job("boom")).await;

    assert_eq!(result.error_code, ResultCode::Failed);
    assert!(result.error_msg.contains("panicked"));
}

#[tokio::test]
async fn test_panicking_constructor_becomes_failure() {
    let mut registry = PluginRegistry::builtin();
    registry.register("explode", build_exploding);
    let executor = RemoteExecutor::new(LocalConnector, registry);

    let result = executor.execute(job("explode")).await;

    assert_eq!(result.error_code, ResultCode::Failed);
    assert!(result.error_msg.contains("panicked"));
}

#[tokio::test]
async fn test_unknown_module_at_execution_is_a_result() {
    let executor = RemoteExecutor::new(LocalConnector, PluginRegistry::empty());

    let result = executor.execute(job("copy")).await;

    assert_eq!(result.error_code, ResultCode::InvalidParams);
    assert!(result.error_msg.contains("unknown module"));
}
