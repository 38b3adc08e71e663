use std::{env, time::Duration};

use crate::error::ConfigError;

pub const STEP_MS_ENV: &str = "TASK_TRACKER_STEP_MS";
pub const DEFAULT_DURATION_ENV: &str = "TASK_TRACKER_DEFAULT_DURATION_SECS";

const DEFAULT_STEP_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_DURATION_SECS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Wall time between two simulator steps. A task always runs
    /// `2 * duration_secs` steps, whatever this is set to.
    pub step_interval: Duration,
    pub default_duration_secs: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            step_interval: DEFAULT_STEP_INTERVAL,
            default_duration_secs: DEFAULT_DURATION_SECS,
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(STEP_MS_ENV) {
            let millis = parse_positive(STEP_MS_ENV, &value)?;
            config.step_interval = Duration::from_millis(u64::from(millis));
        }
        if let Some(value) = lookup(DEFAULT_DURATION_ENV) {
            config.default_duration_secs = parse_positive(DEFAULT_DURATION_ENV, &value)?;
        }
        Ok(config)
    }

    pub fn with_step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        }),
    }
}

/// Lenient duration parsing: anything that is not a positive integer
/// becomes `default` instead of an error.
pub fn coerce_duration(input: &str, default: u32) -> u32 {
    match input.trim().parse::<u32>() {
        Ok(secs) if secs > 0 => secs,
        _ => default,
    }
}
