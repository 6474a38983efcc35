//! Shared helpers for the `opsflow` test suites.
//!
//! - [`builders`]: definitions, jobs, steps and host catalogs without TOML.
//! - [`fake_executor`]: an `ExecutorBackend` that records dispatch order and
//!   concurrency instead of touching hosts.

pub mod builders;
pub mod fake_executor;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use opsflow::logging::LOG_ENV;
use tracing_subscriber::{fmt, EnvFilter};

pub use fake_executor::{ExecEvent, FakeExecutor};

/// Upper bound for a whole test run through the runtime.
pub const TEST_DEADLINE: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Reads the same `OPSFLOW_LOG` filter as the binary and defaults to `warn`,
/// so passing runs stay quiet, e.g. `OPSFLOW_LOG=opsflow=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

        // Another harness may already own the global subscriber.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, failing the test if it outlives [`TEST_DEADLINE`].
///
/// A scheduler that loses a completion never finishes; this turns that hang
/// into a test failure.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_DEADLINE, f).await {
        Ok(out) => out,
        Err(_) => panic!("test did not finish within {TEST_DEADLINE:?}"),
    }
}
