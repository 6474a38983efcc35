// src/exec/batch.rs

//! Per-node fan-out across hosts in bounded batches.

use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::HostDescriptor;
use crate::engine::TaskContext;
use crate::plugins::{ExecutionMeta, PluginResult, ResultCode};
use crate::results::TaskResult;

use super::backend::{ExecutorBackend, HostJob};

/// Run a node's action on every host.
///
/// Hosts are split into batches of `ctx.batch_size`. Executions inside a
/// batch run concurrently; the next batch starts only after every execution
/// of the current one has reported through the completion callback.
pub async fn dispatch_node<E>(ctx: TaskContext, executor: &E)
where
    E: ExecutorBackend + ?Sized,
{
    let batch_size = ctx.batch_size.max(1);
    let meta = ExecutionMeta {
        task_id: ctx.task_id.clone(),
        node_name: ctx.node_name.clone(),
        result_dir: ctx.result_dir.clone(),
    };
    let total = ctx.hosts.len().div_ceil(batch_size);

    for (batch, hosts) in ctx.hosts.chunks(batch_size).enumerate() {
        info!(
            task = %ctx.task_id,
            node = %ctx.node_name,
            batch = batch + 1,
            of = total,
            hosts = hosts.len(),
            "starting batch"
        );
        join_all(hosts.iter().map(|host| run_host(&ctx, executor, host, &meta))).await;
        debug!(node = %ctx.node_name, batch = batch + 1, "batch finished");
    }
}

async fn run_host<E>(ctx: &TaskContext, executor: &E, host: &HostDescriptor, meta: &ExecutionMeta)
where
    E: ExecutorBackend + ?Sized,
{
    let job = HostJob {
        host: host.clone(),
        module: ctx.module.clone(),
        params: ctx.params.clone(),
        meta: meta.clone(),
    };

    // A panicking backend still reports, or the node would never finish.
    let execution = AssertUnwindSafe(async { executor.execute(job).await }).catch_unwind();

    let result = match timeout(ctx.timeout, execution).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => {
            error!(node = %ctx.node_name, host = %host.id, "host execution panicked");
            PluginResult::failure(ResultCode::Failed, "host execution panicked")
        }
        Err(_) => {
            warn!(
                node = %ctx.node_name,
                host = %host.id,
                timeout_secs = ctx.timeout.as_secs(),
                "host execution timed out"
            );
            PluginResult::failure(
                ResultCode::Timeout,
                format!("no result within {}s", ctx.timeout.as_secs()),
            )
        }
    };

    (ctx.callback)(TaskResult {
        node: ctx.node_name.clone(),
        host: host.id.clone(),
        host_ip: host.ip.clone(),
        result,
    });
}
