//! Tracing/logging initialization.
//!
//! - `RUST_LOG` selects the filter (default `info`).
//! - `ACCESSGATE_LOG_FORMAT` selects `json` (default) or `pretty` output.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const FORMAT_VAR: &str = "ACCESSGATE_LOG_FORMAT";
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    #[default]
    Json,
    /// Human-readable multi-line output for local runs.
    Pretty,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log format `{0}` (expected `json` or `pretty`)")]
pub struct LogFormatError(String);

impl FromStr for LogFormat {
    type Err = LogFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(LogFormatError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LogConfig {
    /// Read `RUST_LOG` / `ACCESSGATE_LOG_FORMAT` through `lookup`.
    ///
    /// An unrecognized format falls back to JSON rather than failing startup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match lookup(FORMAT_VAR).map(|raw| raw.parse::<LogFormat>()) {
            Some(Ok(format)) => format,
            Some(Err(err)) => {
                eprintln!("{err}; using json");
                LogFormat::Json
            }
            None => LogFormat::default(),
        };
        let filter = lookup(EnvFilter::DEFAULT_ENV)
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        Self { format, filter }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Install the global subscriber. Returns `false` if one was already set.
    pub fn install(&self) -> bool {
        let filter = EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(tracing_subscriber::fmt::time::SystemTime);

        match self.format {
            LogFormat::Json => builder.json().with_target(false).try_init().is_ok(),
            LogFormat::Pretty => builder.pretty().try_init().is_ok(),
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    LogConfig::from_env().install();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_to_json_at_info() {
        let config = LogConfig::from_lookup(lookup(&[]));
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "info");
    }

    #[test]
    fn reads_format_and_filter() {
        let config = LogConfig::from_lookup(lookup(&[
            ("ACCESSGATE_LOG_FORMAT", " Pretty "),
            ("RUST_LOG", "accessgate_infra=debug"),
        ]));
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.filter, "accessgate_infra=debug");
    }

    #[test]
    fn unknown_format_falls_back_to_json() {
        assert!("xml".parse::<LogFormat>().is_err());
        let config = LogConfig::from_lookup(lookup(&[("ACCESSGATE_LOG_FORMAT", "xml")]));
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn install_twice_is_harmless() {
        let config = LogConfig::default();
        config.install();
        assert!(!config.install());
    }
}
