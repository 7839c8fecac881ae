//! Engine configuration.
//!
//! # Responsibility
//! - Hold the knobs of attribute storage and migration execution.
//! - Read overrides from `ATTRMAN_*` environment variables.
//!
//! # Invariants
//! - Unset variables keep defaults; invalid values are rejected, never ignored.

use crate::db::DEFAULT_BUSY_TIMEOUT;
use crate::visibility::merge::VisibilityPolicy;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const ENV_TRANSACTIONAL_DDL: &str = "ATTRMAN_TRANSACTIONAL_DDL";
pub const ENV_DDL_TIMEOUT_MS: &str = "ATTRMAN_DDL_TIMEOUT_MS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "ATTRMAN_BUSY_TIMEOUT_MS";
pub const ENV_LOCK_STALE_AFTER_MS: &str = "ATTRMAN_LOCK_STALE_AFTER_MS";
pub const ENV_VISIBILITY_POLICY: &str = "ATTRMAN_VISIBILITY_POLICY";

pub const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Invalid environment override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub variable: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid value `{}` for {}; expected {}",
            self.value, self.variable, self.expected
        )
    }
}

impl Error for ConfigError {}

/// Runtime settings of the object manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Apply every pending definition in one transaction.
    pub transactional_ddl: bool,
    /// Wall-clock bound of one `migration_execute` run.
    pub ddl_timeout: Option<Duration>,
    /// SQLite lock wait.
    pub busy_timeout: Duration,
    /// Age after which a held migration lock counts as abandoned.
    pub lock_stale_after: Duration,
    pub visibility_policy: VisibilityPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transactional_ddl: true,
            ddl_timeout: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            lock_stale_after: DEFAULT_LOCK_STALE_AFTER,
            visibility_policy: VisibilityPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which maps variable names to values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_TRANSACTIONAL_DDL) {
            config.transactional_ddl = parse_bool(ENV_TRANSACTIONAL_DDL, &value)?;
        }
        if let Some(value) = lookup(ENV_DDL_TIMEOUT_MS) {
            let timeout = parse_millis(ENV_DDL_TIMEOUT_MS, &value)?;
            // 0 disables the bound.
            config.ddl_timeout = (!timeout.is_zero()).then_some(timeout);
        }
        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout = parse_millis(ENV_BUSY_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_LOCK_STALE_AFTER_MS) {
            config.lock_stale_after = parse_millis(ENV_LOCK_STALE_AFTER_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_VISIBILITY_POLICY) {
            config.visibility_policy =
                VisibilityPolicy::parse(&value).ok_or_else(|| ConfigError {
                    variable: ENV_VISIBILITY_POLICY,
                    value: value.clone(),
                    expected: "refine|wildcard_authoritative",
                })?;
        }
        Ok(config)
    }
}

fn parse_bool(variable: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError {
            variable,
            value: value.to_string(),
            expected: "true|false|1|0",
        }),
    }
}

fn parse_millis(variable: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError {
            variable,
            value: value.to_string(),
            expected: "a non-negative integer of milliseconds",
        })
}
