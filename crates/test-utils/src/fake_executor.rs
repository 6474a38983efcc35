use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use opsflow::exec::{ExecutorBackend, HostJob};
use opsflow::plugins::{PluginResult, ResultCode};

/// Something the fake executor observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Started { node: String, host: String },
    Finished { node: String, host: String },
}

#[derive(Debug, Default)]
struct FakeState {
    events: Vec<ExecEvent>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

/// Decrements the in-flight counter even when a timeout drops the
/// execution future.
struct InFlight {
    state: Arc<Mutex<FakeState>>,
    node: String,
    host: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(n) = state.in_flight.get_mut(&self.node) {
            *n = n.saturating_sub(1);
        }
        state.events.push(ExecEvent::Finished {
            node: self.node.clone(),
            host: self.host.clone(),
        });
    }
}

/// A fake executor that:
/// - records when each (node, host) execution starts and finishes
/// - tracks the peak number of concurrent executions per node
/// - succeeds unless told to fail or hang for a node or host.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    delay: Duration,
    node_delays: HashMap<String, Duration>,
    failing_nodes: HashSet<String>,
    failing_hosts: HashSet<String>,
    hanging_hosts: HashSet<String>,
    panicking_hosts: HashSet<String>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every execution.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay executions of one node instead of the default delay.
    pub fn node_delay(mut self, node: &str, delay: Duration) -> Self {
        self.node_delays.insert(node.to_string(), delay);
        self
    }

    /// Every host of this node fails.
    pub fn fail_node(mut self, node: &str) -> Self {
        self.failing_nodes.insert(node.to_string());
        self
    }

    /// This host fails on every node.
    pub fn fail_host(mut self, host: &str) -> Self {
        self.failing_hosts.insert(host.to_string());
        self
    }

    /// This host never answers.
    pub fn hang_host(mut self, host: &str) -> Self {
        self.hanging_hosts.insert(host.to_string());
        self
    }

    /// Executions on this host panic instead of returning a result.
    pub fn panic_host(mut self, host: &str) -> Self {
        self.panicking_hosts.insert(host.to_string());
        self
    }

    pub fn events(&self) -> Vec<ExecEvent> {
        self.state.lock().events.clone()
    }

    /// `(node, host)` pairs in start order.
    pub fn executed(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ExecEvent::Started { node, host } => Some((node, host)),
                ExecEvent::Finished { .. } => None,
            })
            .collect()
    }

    /// Distinct nodes in first-start order.
    pub fn executed_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = Vec::new();
        for (node, _) in self.executed() {
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
        nodes
    }

    pub fn max_in_flight(&self, node: &str) -> usize {
        self.state.lock().max_in_flight.get(node).copied().unwrap_or(0)
    }

    async fn run(&self, job: HostJob) -> PluginResult {
        let node = job.meta.node_name.clone();
        let host = job.host.id.clone();

        {
            let mut state = self.state.lock();
            state.events.push(ExecEvent::Started {
                node: node.clone(),
                host: host.clone(),
            });
            let n = state.in_flight.entry(node.clone()).or_insert(0);
            *n += 1;
            let current = *n;
            let peak = state.max_in_flight.entry(node.clone()).or_insert(0);
            *peak = (*peak).max(current);
        }
        let _guard = InFlight {
            state: Arc::clone(&self.state),
            node: node.clone(),
            host: host.clone(),
        };

        let delay = self.node_delays.get(&node).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.hanging_hosts.contains(&host) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.panicking_hosts.contains(&host) {
            panic!("executor bug on {host}");
        }

        if self.failing_nodes.contains(&node) || self.failing_hosts.contains(&host) {
            PluginResult::failure(ResultCode::Failed, "injected failure")
        } else {
            PluginResult::success(format!("{node} on {host}"))
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn execute(&self, job: HostJob) -> Pin<Box<dyn Future<Output = PluginResult> + Send + '_>> {
        Box::pin(self.run(job))
    }
}
