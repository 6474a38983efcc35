// src/dag/mod.rs

//! Work node graph and scheduling.
//!
//! - [`graph`] builds the immutable graph of work nodes from a definition,
//!   including the task detail and cycle detection.
//! - [`node`] holds work nodes and their per-cell state.
//! - [`scheduler`] moves nodes through their lifecycle.
//! - [`scheduler_step`] defines the scheduler's result types.
//! - [`state_manager`] pushes outcomes to successors and releases them.

pub mod graph;
pub mod node;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;

pub use graph::{synthetic_root_name, GraphBuilder, TaskGraph};
pub use node::{NodeStatus, PreStatus, StepRef, WorkNode};
pub use scheduler::{aggregate_status, Scheduler};
pub use scheduler_step::{Dispatch, SchedulerStep};
pub use state_manager::StateManager;
