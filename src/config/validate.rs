// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::model::{
    qualified_name, Job, ParsedDefinition, RawDefinition, RawJob, Step,
};
use crate::errors::{OpsflowError, Result};

const DEFAULT_TASK_NAME: &str = "task";

impl TryFrom<RawDefinition> for ParsedDefinition {
    type Error = OpsflowError;

    fn try_from(raw: RawDefinition) -> std::result::Result<Self, Self::Error> {
        validate_raw_definition(&raw)?;

        let mut jobs = BTreeMap::new();
        for (job_name, raw_job) in raw.job.iter() {
            jobs.insert(job_name.clone(), build_job(job_name, raw_job)?);
        }

        let def = ParsedDefinition {
            task_name: raw
                .task
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TASK_NAME.to_string()),
            params: raw.config,
            host_groups: raw.hosts,
            jobs,
        };
        check_cross_job_tokens(&def)?;
        Ok(def)
    }
}

fn validate_raw_definition(raw: &RawDefinition) -> Result<()> {
    ensure_has_steps(raw)?;
    validate_global_params(raw)?;
    validate_names(raw)?;
    validate_job_dependencies(raw)?;
    Ok(())
}

fn ensure_has_steps(raw: &RawDefinition) -> Result<()> {
    if raw.job.values().all(|job| job.step.is_empty()) {
        return Err(OpsflowError::ConfigError(
            "definition must contain at least one [job.<name>.step.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_params(raw: &RawDefinition) -> Result<()> {
    if raw.config.batch_size == 0 {
        return Err(OpsflowError::ConfigError(
            "[config].batch_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.config.timeout == 0 {
        return Err(OpsflowError::ConfigError(
            "[config].timeout must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

/// `:` separates job and step in dependency tokens, so it can't appear in
/// either name.
fn validate_names(raw: &RawDefinition) -> Result<()> {
    for (job_name, job) in raw.job.iter() {
        if job_name.contains(':') || job_name.trim().is_empty() {
            return Err(OpsflowError::ConfigError(format!(
                "invalid job name '{job_name}'"
            )));
        }
        for step_name in job.step.keys() {
            if step_name.contains(':') || step_name.trim().is_empty() {
                return Err(OpsflowError::ConfigError(format!(
                    "invalid step name '{step_name}' in job '{job_name}'"
                )));
            }
        }
    }
    Ok(())
}

fn validate_job_dependencies(raw: &RawDefinition) -> Result<()> {
    for (name, job) in raw.job.iter() {
        for dep in job.after.iter() {
            if !raw.job.contains_key(dep) {
                return Err(OpsflowError::ConfigError(format!(
                    "job '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(OpsflowError::ConfigError(format!(
                    "job '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn build_job(job_name: &str, raw_job: &RawJob) -> Result<Job> {
    let mut steps = BTreeMap::new();

    for (step_name, raw_step) in raw_job.step.iter() {
        let qualified = qualified_name(job_name, step_name);
        let mut after = Vec::with_capacity(raw_step.after.len());

        for token in raw_step.after.iter() {
            let dep = resolve_token(job_name, token, raw_job)
                .ok_or_else(|| OpsflowError::UnresolvedDependency {
                    step: qualified.clone(),
                    token: token.clone(),
                })?;

            if dep == qualified {
                return Err(OpsflowError::DagCycle(format!(
                    "step '{}' depends on itself",
                    qualified
                )));
            }
            if !after.contains(&dep) {
                after.push(dep);
            }
        }

        steps.insert(
            step_name.clone(),
            Step {
                job: job_name.to_string(),
                name: step_name.clone(),
                module: raw_step.module.trim().to_lowercase(),
                hosts: raw_step.hosts.clone(),
                after,
                essential: raw_step.essential,
                ignore_result: raw_step.ignore_result,
                params: serde_json::Value::Object(raw_step.params.clone()),
            },
        );
    }

    Ok(Job {
        name: job_name.to_string(),
        hosts: raw_job.hosts.clone(),
        after: raw_job.after.clone(),
        steps,
    })
}

/// Resolve a dependency token into a qualified `job:step` name.
///
/// Bare tokens refer to a step of the same job. Cross-job tokens are checked
/// against the full definition in [`check_cross_job_tokens`].
fn resolve_token(job_name: &str, token: &str, raw_job: &RawJob) -> Option<String> {
    let token = token.trim();
    match token.split_once(':') {
        None => raw_job
            .step
            .contains_key(token)
            .then(|| qualified_name(job_name, token)),
        Some((job, step)) if !job.is_empty() && !step.is_empty() => {
            Some(qualified_name(job, step))
        }
        Some(_) => None,
    }
}

/// Cross-job tokens can only be checked once every job has been built.
fn check_cross_job_tokens(def: &ParsedDefinition) -> Result<()> {
    for step in def.steps() {
        for dep in step.after.iter() {
            if def.step(dep).is_none() {
                return Err(OpsflowError::UnresolvedDependency {
                    step: step.qualified_name(),
                    token: dep.clone(),
                });
            }
        }
    }
    Ok(())
}
