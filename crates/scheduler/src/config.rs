use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Env var holding the concurrency limit (`unbounded` or a positive integer).
pub const ENV_CONCURRENCY_LIMIT: &str = "PACER_CONCURRENCY_LIMIT";
/// Env var controlling whether the scheduler starts unpaused.
pub const ENV_AUTO_START: &str = "PACER_AUTO_START";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Concurrency limit ───────────────────────────────────────────────

/// Upper bound on the number of tasks running at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyLimit {
    /// Every submission is admitted immediately unless paused.
    #[default]
    Unbounded,
    /// At most this many tasks run concurrently.
    Bounded(NonZeroUsize),
}

impl ConcurrencyLimit {
    /// Build a limit from an optional raw value. `None` means unbounded.
    pub fn from_option(limit: Option<usize>) -> Result<Self, SchedulerError> {
        match limit {
            None => Ok(Self::Unbounded),
            Some(n) => NonZeroUsize::new(n).map(Self::Bounded).ok_or_else(|| {
                SchedulerError::InvalidConfiguration(format!(
                    "expected concurrency limit to be a number from 1 and up, got {n}"
                ))
            }),
        }
    }

    /// Whether another task may start while `pending` tasks are running.
    pub fn admits(&self, pending: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(max) => pending < max.get(),
        }
    }
}

impl fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("unbounded"),
            Self::Bounded(max) => write!(f, "{max}"),
        }
    }
}

// ── Scheduler config ────────────────────────────────────────────────

/// Scheduler configuration, typically parsed from TOML or the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently running tasks. Absent = unbounded.
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
    /// Start admitting work immediately. `false` constructs a paused scheduler.
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

fn default_auto_start() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: None,
            auto_start: default_auto_start(),
        }
    }
}

impl SchedulerConfig {
    /// Config with a fixed concurrency limit, auto-started.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            concurrency_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Same config, but constructed paused.
    pub fn paused(mut self) -> Self {
        self.auto_start = false;
        self
    }

    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Build config from environment variables, loading `.env` first.
    pub fn from_env() -> Result<Self, SchedulerError> {
        load_dotenv();
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PACER_*` overrides read through `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SchedulerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get(ENV_CONCURRENCY_LIMIT) {
            self.concurrency_limit = match v.to_ascii_lowercase().as_str() {
                "unbounded" | "infinite" | "inf" => None,
                other => Some(other.parse::<usize>().map_err(|_| {
                    SchedulerError::InvalidConfiguration(format!(
                        "{ENV_CONCURRENCY_LIMIT}: expected a number from 1 and up or `unbounded`, got `{v}`"
                    ))
                })?),
            };
        }
        if let Some(v) = get(ENV_AUTO_START) {
            self.auto_start = match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(SchedulerError::InvalidConfiguration(format!(
                        "{ENV_AUTO_START}: expected a boolean, got `{v}`"
                    )))
                }
            };
        }
        Ok(())
    }

    /// Validate the config and resolve the concurrency limit.
    pub fn validate(&self) -> Result<ConcurrencyLimit, SchedulerError> {
        ConcurrencyLimit::from_option(self.concurrency_limit)
    }
}
