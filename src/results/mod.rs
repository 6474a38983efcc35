// src/results/mod.rs

//! Result model.
//!
//! - [`model`]: per-host results, aggregate task status and the final report.
//! - [`detail`]: the Task Detail value consumed by the dispatcher.
//! - [`log`]: per-host result logs written by script and command actions.

pub mod detail;
pub mod log;
pub mod model;

pub use detail::{CaseBundle, CaseNodes, DetailBuilder, TaskDetail};
pub use log::{LogKind, ResultLog, ResultLookup};
pub use model::{
    LogStatusSink, NodeReport, ResultStore, StatusSink, TaskReport, TaskResult, TaskStatus,
};
