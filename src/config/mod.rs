// src/config/mod.rs

//! Task definition loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed definition model (`model.rs`).
//! - Load a definition from a path, inline text or a pre-loaded structure
//!   (`loader.rs`).
//! - Validate names, parameters and dependency tokens (`validate.rs`).
//! - Hold the host and action catalogs supplied by the platform
//!   (`catalog.rs`).

pub mod catalog;
pub mod loader;
pub mod model;
pub mod validate;

pub use catalog::{Action, ActionCatalog, HostCatalog, HostDescriptor};
pub use loader::{load_and_validate, load_raw, parse_definition, DefinitionSource};
pub use model::{
    qualified_name, GlobalParams, Job, ParsedDefinition, RawDefinition, RawJob, RawStep, Step,
    TaskSection,
};
