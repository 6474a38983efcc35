// src/plugins/registry.rs

//! Module name -> plugin constructor.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::config::Step;
use crate::errors::{OpsflowError, Result};

use super::{CommandPlugin, CopyPlugin, FetchPlugin, PingPlugin, Plugin, PluginError, ScriptPlugin};

/// Builds a plugin from a step's parameters.
pub type PluginConstructor = fn(&Value) -> std::result::Result<Box<dyn Plugin>, PluginError>;

/// Static table of known modules.
///
/// The table is filled once at startup; graph build checks every step against
/// it so unknown modules and bad parameters never reach a host.
#[derive(Clone)]
pub struct PluginRegistry {
    constructors: BTreeMap<String, PluginConstructor>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("modules", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PluginRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with every built-in module.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("copy", build_copy);
        registry.register("fetch", build_fetch);
        registry.register("ping", build_ping);
        registry.register("shell", build_shell);
        registry.register("script", build_script);
        registry.register("command", build_command);
        registry
    }

    /// Add or replace a module.
    pub fn register(&mut self, module: impl Into<String>, constructor: PluginConstructor) {
        self.constructors.insert(module.into(), constructor);
    }

    pub fn contains(&self, module: &str) -> bool {
        self.constructors.contains_key(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn create(
        &self,
        module: &str,
        params: &Value,
    ) -> std::result::Result<Box<dyn Plugin>, PluginError> {
        let constructor = self
            .constructors
            .get(module)
            .ok_or_else(|| PluginError::InvalidParams(format!("unknown module {module:?}")))?;
        constructor(params)
    }

    /// Check that a step names a known module with valid parameters.
    pub fn validate(&self, step: &Step) -> Result<()> {
        let constructor =
            self.constructors
                .get(&step.module)
                .ok_or_else(|| OpsflowError::UnknownModule {
                    step: step.qualified_name(),
                    module: step.module.clone(),
                })?;
        constructor(&step.params).map_err(|e| OpsflowError::InvalidParams {
            step: step.qualified_name(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

type Built = std::result::Result<Box<dyn Plugin>, PluginError>;

fn build_copy(params: &Value) -> Built {
    Ok(Box::new(CopyPlugin::from_params(params)?))
}

fn build_fetch(params: &Value) -> Built {
    Ok(Box::new(FetchPlugin::from_params(params)?))
}

fn build_ping(params: &Value) -> Built {
    Ok(Box::new(PingPlugin::from_params(params)?))
}

fn build_shell(params: &Value) -> Built {
    Ok(Box::new(ScriptPlugin::shell(params)?))
}

fn build_script(params: &Value) -> Built {
    Ok(Box::new(ScriptPlugin::script(params)?))
}

fn build_command(params: &Value) -> Built {
    Ok(Box::new(CommandPlugin::from_params(params)?))
}
