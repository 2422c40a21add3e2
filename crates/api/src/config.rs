//! Server configuration: listen address, bootstrap administrator and the
//! engine tunables.

use std::net::SocketAddr;

use thiserror::Error;

use accessgate_core::PrincipalId;
use accessgate_infra::{ConfigError, EngineConfig};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error(transparent)]
    Engine(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Principal created at startup and given `ROLE_ADMIN`.
    pub admin_id: PrincipalId,
    pub admin_name: String,
    /// Load the default catalog and bootstrap the administrator at startup.
    pub seed_catalog: bool,
    pub engine: EngineConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            admin_id: PrincipalId::new("admin"),
            admin_name: "System Administrator".to_string(),
            seed_catalog: true,
            engine: EngineConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ApiConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            engine: EngineConfig::from_lookup(&lookup)?,
            ..Self::default()
        };

        if let Some(raw) = lookup("ACCESSGATE_BIND_ADDR") {
            config.bind_addr = raw.trim().parse().map_err(|_| ApiConfigError::Invalid {
                key: "ACCESSGATE_BIND_ADDR",
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup("ACCESSGATE_ADMIN_ID") {
            config.admin_id = PrincipalId::parse(raw.trim()).map_err(|_| ApiConfigError::Invalid {
                key: "ACCESSGATE_ADMIN_ID",
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup("ACCESSGATE_ADMIN_NAME").filter(|v| !v.trim().is_empty()) {
            config.admin_name = raw.trim().to_string();
        }
        if let Some(raw) = lookup("ACCESSGATE_SEED_CATALOG") {
            config.seed_catalog = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ApiConfigError::Invalid {
                        key: "ACCESSGATE_SEED_CATALOG",
                        value: raw,
                    });
                }
            };
        }

        Ok(config)
    }
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
    fn defaults_without_environment() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ApiConfig::default());
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn reads_server_and_engine_settings() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("ACCESSGATE_BIND_ADDR", "127.0.0.1:9000"),
            ("ACCESSGATE_ADMIN_ID", "root.admin"),
            ("ACCESSGATE_SEED_CATALOG", "false"),
            ("ACCESSGATE_ALLOW_SELF_APPROVAL", "true"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.admin_id, PrincipalId::new("root.admin"));
        assert!(!config.seed_catalog);
        assert!(config.engine.allow_self_approval);
    }

    #[test]
    fn rejects_bad_values() {
        let err = ApiConfig::from_lookup(lookup(&[("ACCESSGATE_BIND_ADDR", "nowhere")])).unwrap_err();
        assert!(matches!(err, ApiConfigError::Invalid { key: "ACCESSGATE_BIND_ADDR", .. }));

        let err = ApiConfig::from_lookup(lookup(&[("ACCESSGATE_RETRY_MAX_ATTEMPTS", "0")])).unwrap_err();
        assert!(matches!(err, ApiConfigError::Engine(_)));
    }
}
