// src/exec/remote_client.rs

//! Remote execution client: one connection, one plugin run, per host.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::plugins::{PluginContext, PluginRegistry, PluginResult, ResultCode};
use crate::remote::{Connector, DefaultConnector};

use super::backend::{ExecutorBackend, HostJob};

/// Production executor backend.
///
/// Per host it:
/// - builds the plugin named by the step from the registry
/// - opens the host's shell and file-transfer channels (unless the plugin
///   runs on the controller)
/// - runs the plugin, turning errors into failure results
/// - drops the channels, which closes the connection on every exit path
///
/// A panic anywhere in these steps becomes a `Failed` result for the host.
pub struct RemoteExecutor<C: Connector = DefaultConnector> {
    connector: C,
    registry: PluginRegistry,
}

impl RemoteExecutor<DefaultConnector> {
    pub fn with_defaults() -> Self {
        Self::new(DefaultConnector::default(), PluginRegistry::builtin())
    }
}

impl<C: Connector> RemoteExecutor<C> {
    pub fn new(connector: C, registry: PluginRegistry) -> Self {
        Self {
            connector,
            registry,
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    async fn run(&self, job: HostJob) -> PluginResult {
        let plugin = match self.registry.create(&job.module, &job.params) {
            Ok(plugin) => plugin,
            Err(err) => {
                error!(host = %job.host.id, module = %job.module, error = %err, "cannot build plugin");
                return err.into();
            }
        };

        let channels = if plugin.needs_connection() {
            match self.connector.open(&job.host).await {
                Ok(channels) => Some(channels),
                Err(err) => {
                    warn!(host = %job.host.id, error = %err, "connection failed");
                    return PluginResult::failure(ResultCode::ConnectionFailed, err.to_string());
                }
            }
        } else {
            None
        };

        debug!(host = %job.host.id, node = %job.meta.node_name, module = %job.module, "running plugin");

        let ctx = PluginContext::new(&job.host, &job.meta, channels.as_ref());
        let outcome = plugin.run(&ctx).await;
        drop(ctx);
        drop(channels);

        match outcome {
            Ok(result) => {
                info!(host = %job.host.id, node = %job.meta.node_name, code = ?result.error_code, "host execution finished");
                result
            }
            Err(err) => {
                warn!(host = %job.host.id, node = %job.meta.node_name, error = %err, "plugin failed");
                err.into()
            }
        }
    }
}

impl<C: Connector> ExecutorBackend for RemoteExecutor<C> {
    fn execute(&self, job: HostJob) -> Pin<Box<dyn Future<Output = PluginResult> + Send + '_>> {
        let host = job.host.id.clone();
        let node = job.meta.node_name.clone();
        Box::pin(AssertUnwindSafe(self.run(job)).catch_unwind().map(move |outcome| {
            outcome.unwrap_or_else(|_| {
                error!(host = %host, node = %node, "host execution panicked");
                PluginResult::failure(ResultCode::Failed, "host execution panicked")
            })
        }))
    }
}
