// src/engine/completion.rs

//! Per-node completion tracking.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::atomic::AtomicInt;
use crate::dag::Scheduler;
use crate::plugins::PluginResult;
use crate::results::{ResultStore, TaskResult};

use super::{CompletionCallback, RuntimeEvent};

/// Collects the host results of one node and finishes the node when the
/// last one arrives.
///
/// This is the only place a dispatched node is finished, and therefore the
/// only trigger for releasing its successors.
pub struct NodeCompletion {
    node: usize,
    remaining: AtomicInt,
    results: Mutex<Vec<PluginResult>>,
    scheduler: Arc<Scheduler>,
    store: Arc<ResultStore>,
    events: mpsc::UnboundedSender<RuntimeEvent>,
}

impl NodeCompletion {
    /// Build the completion callback for a node dispatched to `hosts` hosts.
    pub fn callback(
        node: usize,
        hosts: usize,
        scheduler: Arc<Scheduler>,
        store: Arc<ResultStore>,
        events: mpsc::UnboundedSender<RuntimeEvent>,
    ) -> CompletionCallback {
        let tracker = Arc::new(Self {
            node,
            remaining: AtomicInt::new(hosts as i64),
            results: Mutex::new(Vec::with_capacity(hosts)),
            scheduler,
            store,
            events,
        });
        Arc::new(move |result| tracker.on_host_result(result))
    }

    fn on_host_result(&self, result: TaskResult) {
        debug!(node = %result.node, host = %result.host, code = ?result.result.error_code, "host result");
        self.store.record(result.clone());
        self.results.lock().push(result.result);

        match self.remaining.decrement() {
            Some(0) => self.finish(),
            Some(_) => {}
            None => warn!(node = %result.node, host = %result.host, "result after node finished; ignoring"),
        }
    }

    fn finish(&self) {
        let results = self.results.lock().clone();
        let step = self.scheduler.complete(self.node, &results);
        if self.events.send(RuntimeEvent::NodeFinished(step)).is_err() {
            warn!(node = self.node, "runtime loop is gone; dropping completion");
        }
    }
}
