//! Engine configuration loading and representation.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use accessgate_core::RetryPolicy;

/// Longest accepted "expiring soon" horizon (about a century).
pub const MAX_EXPIRING_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Tunables for `AccessEngine`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// Bound of the audit FIFO before `record` applies backpressure.
    pub audit_queue_capacity: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Let requesters/targets approve their own requests.
    pub allow_self_approval: bool,
    /// Create unknown principals found during directory sync.
    pub auto_create_principals: bool,
    /// Horizon for the "expiring soon" figure in the summary.
    pub expiring_window_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            audit_queue_capacity: 10_000,
            default_page_size: 50,
            max_page_size: 1000,
            allow_self_approval: false,
            auto_create_principals: true,
            expiring_window_days: 30,
        }
    }
}

impl EngineConfig {
    /// Read `ACCESSGATE_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse(&lookup, "ACCESSGATE_RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = v;
        }
        if let Some(v) = parse(&lookup, "ACCESSGATE_RETRY_INITIAL_BACKOFF_MS")? {
            config.retry.initial_backoff_ms = v;
        }
        if let Some(v) = parse(&lookup, "ACCESSGATE_RETRY_MAX_BACKOFF_MS")? {
            config.retry.max_backoff_ms = v;
        }
        if let Some(v) = parse(&lookup, "ACCESSGATE_AUDIT_QUEUE_CAPACITY")? {
            config.audit_queue_capacity = v;
        }
        if let Some(v) = parse(&lookup, "ACCESSGATE_PAGE_SIZE")? {
            config.default_page_size = v;
        }
        if let Some(v) = parse(&lookup, "ACCESSGATE_MAX_PAGE_SIZE")? {
            config.max_page_size = v;
        }
        if let Some(v) = parse_bool(&lookup, "ACCESSGATE_ALLOW_SELF_APPROVAL")? {
            config.allow_self_approval = v;
        }
        if let Some(v) = parse_bool(&lookup, "ACCESSGATE_AUTO_CREATE_PRINCIPALS")? {
            config.auto_create_principals = v;
        }
        if let Some(v) = parse(&lookup, "ACCESSGATE_EXPIRING_WINDOW_DAYS")? {
            config.expiring_window_days = v;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, value: String, reason: &str| ConfigError::Invalid {
            key,
            value,
            reason: reason.to_string(),
        };

        if self.retry.max_attempts == 0 {
            return Err(invalid("ACCESSGATE_RETRY_MAX_ATTEMPTS", "0".into(), "must be at least 1"));
        }
        if self.audit_queue_capacity == 0 {
            return Err(invalid("ACCESSGATE_AUDIT_QUEUE_CAPACITY", "0".into(), "must be at least 1"));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(invalid(
                "ACCESSGATE_PAGE_SIZE",
                self.default_page_size.to_string(),
                "must be between 1 and the max page size",
            ));
        }
        if !(0..=MAX_EXPIRING_WINDOW_DAYS).contains(&self.expiring_window_days) {
            return Err(invalid(
                "ACCESSGATE_EXPIRING_WINDOW_DAYS",
                self.expiring_window_days.to_string(),
                "must be between 0 and 36500",
            ));
        }
        Ok(())
    }

    /// The horizon, clamped to the accepted range for hand-built configs.
    pub fn expiring_window(&self) -> Duration {
        Duration::days(self.expiring_window_days.clamp(0, MAX_EXPIRING_WINDOW_DAYS))
    }

    /// Clamp a caller-supplied page size.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

fn parse<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool<F>(lookup: &F, key: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(v) => Err(ConfigError::Invalid {
            key,
            value: v,
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.allow_self_approval);
    }

    #[test]
    fn overrides_are_applied() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("ACCESSGATE_RETRY_MAX_ATTEMPTS", "5"),
            ("ACCESSGATE_ALLOW_SELF_APPROVAL", "true"),
            ("ACCESSGATE_AUTO_CREATE_PRINCIPALS", "off"),
            ("ACCESSGATE_EXPIRING_WINDOW_DAYS", " 7 "),
        ]))
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.allow_self_approval);
        assert!(!config.auto_create_principals);
        assert_eq!(config.expiring_window(), Duration::days(7));
    }

    #[test]
    fn bad_values_are_reported_with_their_key() {
        let err = EngineConfig::from_lookup(lookup(&[("ACCESSGATE_PAGE_SIZE", "lots")])).unwrap_err();
        assert!(err.to_string().contains("ACCESSGATE_PAGE_SIZE"));

        let err = EngineConfig::from_lookup(lookup(&[("ACCESSGATE_RETRY_MAX_ATTEMPTS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ACCESSGATE_RETRY_MAX_ATTEMPTS", .. }));

        let err = EngineConfig::from_lookup(lookup(&[("ACCESSGATE_EXPIRING_WINDOW_DAYS", "9223372036854775807")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ACCESSGATE_EXPIRING_WINDOW_DAYS", .. }));
    }

    #[test]
    fn hand_built_window_is_clamped() {
        let config = EngineConfig {
            expiring_window_days: i64::MAX,
            ..EngineConfig::default()
        };
        assert_eq!(config.expiring_window(), Duration::days(MAX_EXPIRING_WINDOW_DAYS));
    }

    #[test]
    fn page_size_is_clamped() {
        let config = EngineConfig::default();
        assert_eq!(config.page_size(None), 50);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(5000)), 1000);
    }
}
