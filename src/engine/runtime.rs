// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::{Dispatch, Scheduler, TaskGraph};
use crate::errors::{OpsflowError, Result};
use crate::exec::{dispatch_node, ExecutorBackend};
use crate::plugins::{PluginResult, ResultCode};
use crate::results::{
    LogStatusSink, NodeReport, ResultStore, StatusSink, TaskReport, TaskResult,
};

use super::completion::NodeCompletion;
use super::core::CoreRuntime;
use super::{RuntimeEvent, TaskContext};

/// Drives one task run: releases ready nodes, dispatches them through an
/// `ExecutorBackend`, and reports progress until every node is terminal.
///
/// The semantics live in [`Scheduler`] and [`CoreRuntime`]; this struct only
/// handles the async side: spawning node dispatches and reading completion
/// events.
pub struct Runtime<E: ExecutorBackend + 'static> {
    scheduler: Arc<Scheduler>,
    executor: Arc<E>,
    store: Arc<ResultStore>,
    sink: Arc<dyn StatusSink>,
    core: CoreRuntime,
    event_tx: mpsc::UnboundedSender<RuntimeEvent>,
    event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
}

impl<E: ExecutorBackend + 'static> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend + 'static> Runtime<E> {
    pub fn new(scheduler: Scheduler, executor: Arc<E>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let core = CoreRuntime::new(scheduler.graph().len());
        Self {
            scheduler: Arc::new(scheduler),
            executor,
            store: Arc::new(ResultStore::new()),
            sink: Arc::new(LogStatusSink),
            core,
            event_tx,
            event_rx,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Main event loop.
    ///
    /// - Marks root nodes ready and launches them.
    /// - Consumes `NodeFinished` events, updates progress, and launches the
    ///   successors each event released.
    /// - Returns once every node is terminal.
    pub async fn run(mut self) -> Result<TaskReport> {
        let graph = Arc::clone(self.scheduler.graph());
        info!(task = %graph.task_name, task_id = %graph.task_id, "opsflow runtime started");
        self.sink
            .update(&graph.task_id, self.core.status(), self.core.progress());

        for idx in self.scheduler.start() {
            self.launch(idx);
        }

        while !self.core.is_done() {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    return Err(OpsflowError::ConfigError(
                        "runtime event channel closed before the task finished".to_string(),
                    ));
                }
            };

            debug!(?event, "runtime received event");

            match event {
                RuntimeEvent::NodeFinished(step) => {
                    self.core.record(step.status);
                    self.sink
                        .update(&graph.task_id, self.core.status(), self.core.progress());
                    for idx in step.released {
                        self.launch(idx);
                    }
                }
            }
        }

        let report = TaskReport {
            task_id: graph.task_id.clone(),
            status: self.core.status(),
            progress: self.core.progress(),
            nodes: graph
                .nodes()
                .iter()
                .map(|n| NodeReport {
                    name: n.name.clone(),
                    status: n.status(),
                    reason: n.status_reason(),
                })
                .collect(),
            results: self.store.snapshot(),
        };
        info!(task_id = %report.task_id, status = %report.status, "runtime exiting");
        Ok(report)
    }

    /// Start a ready node. Nodes without host work finish immediately.
    fn launch(&self, idx: usize) {
        let graph = self.scheduler.graph();
        let Some(node) = graph.node(idx) else {
            warn!(node = idx, "launch of unknown node");
            return;
        };

        match self.scheduler.begin(idx) {
            Dispatch::Ignore => {}
            Dispatch::Synthetic => {
                self.emit(self.scheduler.complete(idx, &[]));
            }
            Dispatch::Skip { hosts, reason } => {
                for host in hosts {
                    self.store.record(TaskResult {
                        node: node.name.clone(),
                        host: host.id,
                        host_ip: host.ip,
                        result: PluginResult::failure(ResultCode::PreDependencyError, reason.clone()),
                    });
                }
                self.emit(self.scheduler.skip(idx));
            }
            Dispatch::Run { hosts, .. } if hosts.is_empty() => {
                info!(node = %node.name, "node has no hosts; nothing to run");
                self.emit(self.scheduler.complete(idx, &[]));
            }
            Dispatch::Run {
                hosts,
                module,
                params,
            } => {
                let callback = NodeCompletion::callback(
                    idx,
                    hosts.len(),
                    Arc::clone(&self.scheduler),
                    Arc::clone(&self.store),
                    self.event_tx.clone(),
                );
                let ctx = TaskContext {
                    hosts,
                    module,
                    params,
                    batch_size: graph.params.batch_size,
                    timeout: Duration::from_secs(graph.params.timeout),
                    node_name: node.name.clone(),
                    task_id: graph.task_id.clone(),
                    result_dir: graph.params.result_dir.clone(),
                    callback,
                };
                let executor = Arc::clone(&self.executor);
                tokio::spawn(async move {
                    dispatch_node(ctx, executor.as_ref()).await;
                });
            }
        }
    }

    fn emit(&self, step: crate::dag::SchedulerStep) {
        // The receiver lives in `self`, so this cannot fail while we run.
        let _ = self.event_tx.send(RuntimeEvent::NodeFinished(step));
    }
}
