use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What happens to a step whose predecessors did not all succeed.
///
/// - `RunWhenEssential`: the step is skipped with a pre-dependency error unless
///   it is marked `essential`, in which case it still executes (default).
/// - `SkipWhenEssential`: the reverse reading; essential steps are skipped,
///   non-essential steps still execute.
///
/// Synthetic join nodes are never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EssentialPolicy {
    RunWhenEssential,
    SkipWhenEssential,
}

impl EssentialPolicy {
    /// Decide whether a step with a failed predecessor should be skipped.
    pub fn should_skip(self, essential: bool) -> bool {
        match self {
            EssentialPolicy::RunWhenEssential => !essential,
            EssentialPolicy::SkipWhenEssential => essential,
        }
    }
}

impl Default for EssentialPolicy {
    fn default() -> Self {
        EssentialPolicy::RunWhenEssential
    }
}

impl FromStr for EssentialPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "run_when_essential" => Ok(EssentialPolicy::RunWhenEssential),
            "skip_when_essential" => Ok(EssentialPolicy::SkipWhenEssential),
            other => Err(format!(
                "invalid essential_policy: {other} (expected \"run_when_essential\" or \"skip_when_essential\")"
            )),
        }
    }
}

/// How the controller reaches a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// SSH with a password.
    Password,
    /// SSH with a private key file.
    Key,
    /// Run on the controller itself (`sh -c` + local filesystem).
    Local,
}

impl Default for ConnectionMode {
    fn default() -> Self {
        ConnectionMode::Password
    }
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "password" => Ok(ConnectionMode::Password),
            "key" => Ok(ConnectionMode::Key),
            "local" => Ok(ConnectionMode::Local),
            other => Err(format!(
                "invalid connection mode: {other} (expected \"password\", \"key\" or \"local\")"
            )),
        }
    }
}
