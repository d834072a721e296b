//! Coordinator configuration
//!
//! Every mode flag the coordinator consults lives in [`RevertConfig`]. The
//! coordinator clones it once at the start of each operation, so a flag
//! flipped mid-pass only takes effect on the next one.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TetherError;

/// Default wall-clock budget for a single revert pass
pub const DEFAULT_REVERT_BUDGET: Duration = Duration::from_millis(200);

/// Default timeout for a single git invocation
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a single revert pass may run before the rest is deferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertBudget {
    /// Stop once this much wall-clock time has elapsed
    Timeout(#[serde(with = "millis")] Duration),
    /// Stop as soon as interactive input is pending
    StopOnInput,
}

impl Default for RevertBudget {
    fn default() -> Self {
        Self::Timeout(DEFAULT_REVERT_BUDGET)
    }
}

/// Configuration for the revert coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevertConfig {
    /// The generic "revert every buffer" mode is active. Buffers then rely on
    /// it and are never individually monitored.
    pub global_revert: bool,
    /// Local monitoring mode: buffers in a repository are monitored
    pub monitoring: bool,
    /// Revert affected buffers right after each repository-mutating operation
    pub revert_immediately: bool,
    /// Only monitor files registered in version control
    pub tracked_only: bool,
    /// Budget for one revert pass
    pub budget: RevertBudget,
    /// Limit for one git invocation
    #[serde(with = "millis")]
    pub git_timeout: Duration,
}

impl Default for RevertConfig {
    fn default() -> Self {
        Self {
            global_revert: false,
            monitoring: true,
            revert_immediately: true,
            tracked_only: true,
            budget: RevertBudget::default(),
            git_timeout: DEFAULT_GIT_TIMEOUT,
        }
    }
}

impl RevertConfig {
    /// Parse a JSON document. Missing keys fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self, TetherError> {
        serde_json::from_str(json).map_err(|e| TetherError::Config(e.to_string()))
    }

    /// Defaults overlaid with `TETHER_*` environment variables
    pub fn from_env() -> Result<Self, TetherError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, TetherError> {
        if let Some(secs) = lookup("TETHER_GIT_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                TetherError::Config(format!("TETHER_GIT_TIMEOUT_SECS: invalid value {secs:?}"))
            })?;
            self.git_timeout = Duration::from_secs(secs);
        }

        if let Some(budget) = lookup("TETHER_REVERT_BUDGET_MS") {
            let ms: u64 = budget.trim().parse().map_err(|_| {
                TetherError::Config(format!("TETHER_REVERT_BUDGET_MS: invalid value {budget:?}"))
            })?;
            self.budget = RevertBudget::Timeout(Duration::from_millis(ms));
        }

        // Takes precedence over a millisecond budget
        if let Some(flag) = lookup("TETHER_REVERT_ON_INPUT") {
            if parse_flag("TETHER_REVERT_ON_INPUT", &flag)? {
                self.budget = RevertBudget::StopOnInput;
            }
        }

        if let Some(flag) = lookup("TETHER_TRACKED_ONLY") {
            self.tracked_only = parse_flag("TETHER_TRACKED_ONLY", &flag)?;
        }

        Ok(self)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, TetherError> {
    match value.trim() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(TetherError::Config(format!("{key}: invalid value {other:?}"))),
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(d.as_millis()).map_err(serde::ser::Error::custom)?;
        s.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
