// src/exec/mod.rs

//! Host execution layer.
//!
//! - [`backend`] provides the `ExecutorBackend` trait the dispatcher calls for
//!   each host; tests can replace it with a fake implementation.
//! - [`batch`] fans a node out over its hosts in bounded, blocking batches
//!   and applies the per-host timeout.
//! - [`remote_client`] is the production backend: connect, run the plugin,
//!   always disconnect.

pub mod backend;
pub mod batch;
pub mod remote_client;

pub use backend::{ExecutorBackend, HostJob};
pub use batch::dispatch_node;
pub use remote_client::RemoteExecutor;
