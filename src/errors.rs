// src/errors.rs

//! Crate-wide error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why a task definition could not be loaded.
///
/// These are never fatal to the process; the parser logs them and the caller
/// decides how to react.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("definition at {path:?} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("definition is empty")]
    Empty,

    #[error("definition is malformed: {0}")]
    Malformed(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum OpsflowError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unresolved dependency '{token}' in step '{step}'")]
    UnresolvedDependency { step: String, token: String },

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("Unknown module '{module}' in step '{step}'")]
    UnknownModule { step: String, module: String },

    #[error("Invalid parameters for step '{step}': {reason}")]
    InvalidParams { step: String, reason: String },

    #[error("Unknown action '{action}' referenced by step '{step}'")]
    UnknownAction { step: String, action: String },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OpsflowError {
    /// Whether this error was detected while loading or building a task,
    /// before anything was dispatched.
    pub fn is_definition_error(&self) -> bool {
        !matches!(self, OpsflowError::IoError(_) | OpsflowError::Other(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, OpsflowError>;
