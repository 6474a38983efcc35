// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::model::{ParsedDefinition, RawDefinition};
use crate::errors::{DefinitionError, Result};

/// Where a task definition comes from.
#[derive(Debug, Clone)]
pub enum DefinitionSource {
    /// A TOML file on disk.
    Path(PathBuf),
    /// Inline TOML text.
    Text(String),
    /// An already deserialized structure (e.g. handed over by an API layer).
    Raw(RawDefinition),
}

/// Read a definition into its raw, unchecked form.
///
/// Unreadable paths, empty content and malformed TOML each produce their own
/// [`DefinitionError`]; the error is logged here and returned to the caller.
pub fn load_raw(source: DefinitionSource) -> std::result::Result<RawDefinition, DefinitionError> {
    let result = match source {
        DefinitionSource::Path(path) => read_path(&path).and_then(|text| parse_text(&text)),
        DefinitionSource::Text(text) => parse_text(&text),
        DefinitionSource::Raw(raw) => Ok(raw),
    };

    if let Err(ref err) = result {
        warn!(error = %err, "failed to load task definition");
    }
    result
}

fn read_path(path: &Path) -> std::result::Result<String, DefinitionError> {
    debug!(path = ?path, "reading task definition");
    fs::read_to_string(path).map_err(|source| DefinitionError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_text(text: &str) -> std::result::Result<RawDefinition, DefinitionError> {
    if text.trim().is_empty() {
        return Err(DefinitionError::Empty);
    }
    let raw: RawDefinition = toml::from_str(text)?;
    Ok(raw)
}

/// Load a definition and run semantic validation.
///
/// This is the recommended entry point:
///
/// - Reads TOML (or takes a pre-loaded structure).
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Resolves bare and `job:step` dependency tokens, rejecting unknown ones.
///
/// Host resolution and cycle detection happen when the graph is built.
pub fn parse_definition(source: DefinitionSource) -> Result<ParsedDefinition> {
    let raw = load_raw(source)?;
    let def = ParsedDefinition::try_from(raw)?;
    debug!(
        task = %def.task_name,
        jobs = def.jobs.len(),
        steps = def.step_count(),
        "parsed task definition"
    );
    Ok(def)
}

/// Convenience wrapper for a definition file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ParsedDefinition> {
    parse_definition(DefinitionSource::Path(path.as_ref().to_path_buf()))
}
