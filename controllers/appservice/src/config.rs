//! Controller configuration from environment variables.

use crate::error::ControllerError;
use crate::reconciler::conflict::DEFAULT_CONFLICT_ATTEMPTS;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: u16 = 3;
pub const DEFAULT_DEBOUNCE_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Maximum reconciles running at once
    pub concurrency: u16,
    /// Quiet period after the last event before a reconcile starts
    pub debounce: Duration,
    /// Write attempts per update before a conflict is returned
    pub conflict_retry_attempts: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            concurrency: DEFAULT_CONCURRENCY,
            debounce: Duration::from_secs(DEFAULT_DEBOUNCE_SECS),
            conflict_retry_attempts: DEFAULT_CONFLICT_ATTEMPTS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let concurrency = parse_or(&lookup, "RECONCILE_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        let debounce_secs = parse_or(&lookup, "RECONCILE_DEBOUNCE_SECS", DEFAULT_DEBOUNCE_SECS)?;
        let conflict_retry_attempts =
            parse_or(&lookup, "CONFLICT_RETRY_ATTEMPTS", defaults.conflict_retry_attempts)?;
        if conflict_retry_attempts == 0 {
            return Err(ControllerError::InvalidConfig(
                "CONFLICT_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            namespace,
            concurrency,
            debounce: Duration::from_secs(debounce_secs),
            conflict_retry_attempts,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", key, raw, e))
        }),
    }
}
