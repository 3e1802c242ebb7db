//! Runtime configuration, read from the environment (and `.env`, if present).

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use eshop_infra::db::DatabaseConfig;
use eshop_orders::PlacementPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the API binary needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// `None` runs the service on the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// Create missing tables at startup.
    pub apply_schema: bool,
    pub placement: PlacementPolicy,
}

impl ApiConfig {
    /// Load from process environment, after merging a `.env` file if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenv::dotenv().is_ok() {
            tracing::debug!("loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host: IpAddr = parse_or(&lookup, "HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port: u16 = parse_or(&lookup, "PORT", 3001)?;

        let database = match lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => {
                let mut db = DatabaseConfig::new(url);
                db.max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", db.max_connections)?;
                if db.max_connections == 0 {
                    return Err(ConfigError::Invalid {
                        key: "DB_MAX_CONNECTIONS",
                        value: "0".to_string(),
                        reason: "must be at least 1".to_string(),
                    });
                }
                db.acquire_timeout = Duration::from_millis(parse_or(
                    &lookup,
                    "DB_ACQUIRE_TIMEOUT_MS",
                    db.acquire_timeout.as_millis() as u64,
                )?);
                Some(db)
            }
            None => None,
        };

        let defaults = PlacementPolicy::default();
        let placement = PlacementPolicy {
            verify_user_exists: parse_or(&lookup, "ORDER_VERIFY_USER", defaults.verify_user_exists)?,
            transaction_timeout: Duration::from_millis(parse_or(
                &lookup,
                "ORDER_TX_TIMEOUT_MS",
                defaults.transaction_timeout.as_millis() as u64,
            )?),
        };

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            database,
            apply_schema: parse_or(&lookup, "DB_APPLY_SCHEMA", false)?,
            placement,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_run_in_memory_on_3001() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 3001);
        assert!(cfg.database.is_none());
        assert!(!cfg.apply_schema);
        assert_eq!(cfg.placement, PlacementPolicy::default());
    }

    #[test]
    fn database_settings_are_read() {
        let cfg = load(&[
            ("DATABASE_URL", "postgres://localhost/eshop"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("DB_ACQUIRE_TIMEOUT_MS", "250"),
            ("ORDER_TX_TIMEOUT_MS", "1500"),
            ("ORDER_VERIFY_USER", "true"),
        ])
        .unwrap();

        let db = cfg.database.unwrap();
        assert_eq!(db.max_connections, 4);
        assert_eq!(db.acquire_timeout, Duration::from_millis(250));
        assert_eq!(cfg.placement.transaction_timeout, Duration::from_millis(1500));
        assert!(cfg.placement.verify_user_exists);
    }

    #[test]
    fn invalid_values_are_reported_with_their_key() {
        let err = load(&[("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = load(&[("DATABASE_URL", "postgres://x"), ("DB_MAX_CONNECTIONS", "0")]).unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }
}
