// tests/integration/error_handling.rs

use std::io::Write;

use tempfile::NamedTempFile;

use opsflow::config::{load_and_validate, ActionCatalog, HostCatalog};
use opsflow::errors::{DefinitionError, OpsflowError};
use opsflow::plugins::{PluginError, PluginResult, ResultCode};
use opsflow::remote::RemoteError;

#[test]
fn test_dag_cycle_in_file_returns_structured_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[hosts]
all = ["local"]

[job.a]
hosts = ["all"]

[job.a.step.one]
module = "command"
after = ["two"]
params = {{ commands = ["true"] }}

[job.a.step.two]
module = "command"
after = ["one"]
params = {{ commands = ["true"] }}
"#
    )
    .unwrap();

    let def = load_and_validate(file.path()).unwrap();
    let result = opsflow::build_graph(
        &def,
        &HostCatalog::new(),
        &ActionCatalog::new(),
        &opsflow::plugins::PluginRegistry::builtin(),
        None,
    );

    match result {
        Err(OpsflowError::DagCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains("a:one") || msg.contains("a:two"));
        }
        Err(e) => panic!("Expected DagCycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_invalid_toml_type_is_malformed() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[config]
batch_size = "five"

[job.a.step.one]
module = "ping"
"#
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(OpsflowError::Definition(DefinitionError::Malformed(e))) => {
            assert!(e.to_string().contains("five"));
        }
        other => panic!("Expected Malformed, got: {:?}", other),
    }
}

#[test]
fn test_error_messages_name_the_step() {
    let err = OpsflowError::UnknownModule {
        step: "deploy:upload".to_string(),
        module: "scp".to_string(),
    };
    assert_eq!(err.to_string(), "Unknown module 'scp' in step 'deploy:upload'");

    let err = OpsflowError::UnresolvedDependency {
        step: "deploy:restart".to_string(),
        token: "build:missing".to_string(),
    };
    assert!(err.to_string().contains("build:missing"));
    assert!(err.to_string().contains("deploy:restart"));
}

#[test]
fn test_plugin_errors_map_to_result_codes() {
    let cases = [
        (PluginError::LocalPathMissing("a".into()), ResultCode::LocalPathMissing),
        (PluginError::RemotePathMissing("a".into()), ResultCode::RemotePathMissing),
        (PluginError::PathIsDirectory("a".into()), ResultCode::PathIsDirectory),
        (
            PluginError::IntegrityMismatch {
                path: "/tmp/a".into(),
                local: "aa".into(),
                remote: "bb".into(),
            },
            ResultCode::IntegrityMismatch,
        ),
        (
            PluginError::NonZeroExit {
                status: 2,
                output: "oops".into(),
            },
            ResultCode::NonZeroExit,
        ),
        (PluginError::Unreachable("a".into()), ResultCode::Unreachable),
        (PluginError::InvalidParams("a".into()), ResultCode::InvalidParams),
        (
            PluginError::Remote(RemoteError::Connect {
                host: "h".into(),
                reason: "refused".into(),
            }),
            ResultCode::ConnectionFailed,
        ),
        (
            PluginError::Remote(RemoteError::Auth {
                host: "h".into(),
                reason: "denied".into(),
            }),
            ResultCode::ConnectionFailed,
        ),
        (
            PluginError::Remote(RemoteError::Transfer("eof".into())),
            ResultCode::Failed,
        ),
        (PluginError::NoConnection, ResultCode::Failed),
    ];

    for (err, code) in cases {
        let message = err.to_string();
        let result = PluginResult::from(err);
        assert_eq!(result.error_code, code, "{message}");
        assert_eq!(result.error_msg, message);
        assert!(!result.is_success());
    }
}

#[test]
fn test_integrity_mismatch_message_has_both_digests() {
    let err = PluginError::IntegrityMismatch {
        path: "/srv/app.tgz".into(),
        local: "aaaa".into(),
        remote: "bbbb".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("/srv/app.tgz"));
    assert!(msg.contains("aaaa"));
    assert!(msg.contains("bbbb"));
}

#[test]
fn test_tracing_setup_is_idempotent() {
    opsflow_test_utils::init_tracing();
    opsflow_test_utils::init_tracing();
    tracing::warn!(target: "opsflow", "still logging after a second init");
}

#[tokio::test]
#[should_panic(expected = "did not finish")]
async fn test_stuck_run_fails_the_test_instead_of_hanging() {
    opsflow_test_utils::with_timeout(std::future::pending::<()>()).await;
}
