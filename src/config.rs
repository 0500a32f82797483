//! Environment configuration.

use std::env;
use std::str::FromStr;
use thiserror::Error;
use crate::domain::aggregates::TransitionPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend { Postgres, Memory }

impl FromStr for StoreBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub nats_url: Option<String>,
    pub status_policy: TransitionPolicy,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable '{0}'")]
    Missing(&'static str),
    #[error("Invalid value for '{var}': {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl Config {
    /// Reads configuration from the process environment (after loading `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parsed<T: FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
        where T::Err: std::fmt::Display {
            match raw {
                None => Ok(default),
                Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid { var, reason: e.to_string() }),
            }
        }

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parsed("PORT", lookup("PORT"), 8083u16)?;
        let store_backend = parsed("STORE_BACKEND", lookup("STORE_BACKEND"), StoreBackend::Postgres)?;
        let database_url = lookup("DATABASE_URL").filter(|v| !v.is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        let db_max_connections = parsed("DB_MAX_CONNECTIONS", lookup("DB_MAX_CONNECTIONS"), 10u32)?;
        let nats_url = lookup("NATS_URL").filter(|v| !v.is_empty());
        let status_policy = parsed("ORDER_STATUS_POLICY", lookup("ORDER_STATUS_POLICY"), TransitionPolicy::Lifecycle)?;

        Ok(Self { host, port, store_backend, database_url, db_max_connections, nats_url, status_policy })
    }

    pub fn bind_address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[("DATABASE_URL", "postgres://localhost/shop")]).unwrap();
        assert_eq!(c.bind_address(), "0.0.0.0:8083");
        assert_eq!(c.store_backend, StoreBackend::Postgres);
        assert_eq!(c.status_policy, TransitionPolicy::Lifecycle);
        assert_eq!(c.db_max_connections, 10);
        assert!(c.nats_url.is_none());
    }

    #[test]
    fn test_postgres_requires_database_url() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("DATABASE_URL"))));
        assert!(config(&[("STORE_BACKEND", "memory")]).is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let err = config(&[("STORE_BACKEND", "memory"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
        let err = config(&[("STORE_BACKEND", "memory"), ("ORDER_STATUS_POLICY", "anything")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "ORDER_STATUS_POLICY", .. }));
        let c = config(&[("STORE_BACKEND", "memory"), ("ORDER_STATUS_POLICY", "unrestricted")]).unwrap();
        assert_eq!(c.status_policy, TransitionPolicy::Unrestricted);
    }
}
