//! Database connection pool management
//!
//! Provides PostgreSQL pool creation and configuration on top of deadpool-postgres.

use deadpool_postgres::tokio_postgres::{Config as PgConfig, NoTls};
use deadpool_postgres::{Manager, ManagerConfig, RecyclingMethod, Runtime};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

pub use deadpool_postgres::{Pool, PoolError};

pub type PgPool = Pool;

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("invalid database url: {0}")]
    InvalidUrl(#[from] tokio_postgres::Error),

    #[error("failed to build pool: {0}")]
    Build(String),

    #[error("connection verification failed: {0}")]
    Verify(#[from] PoolError),

    #[error("connection verification timed out after {0}s")]
    Timeout(u64),
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Service name for log labeling
    pub service_name: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Connection creation timeout (new connection to PostgreSQL)
    pub connect_timeout_secs: u64,
    /// Connection acquisition timeout (get connection from pool)
    pub acquire_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 20,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl DbConfig {
    /// Create a new DbConfig from environment variables
    pub fn from_env(service_name: &str) -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable not set".to_string())?;
        Ok(Self::for_url(service_name, database_url))
    }

    /// Config for an explicit URL, with `DB_*` pool overrides read from the environment
    pub fn for_url(service_name: &str, database_url: impl Into<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: service_name.to_string(),
            database_url: database_url.into(),
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout_secs),
        }
    }

    /// Log pool configuration details
    pub fn log_config(&self) {
        info!(
            service = %self.service_name,
            max_connections = self.max_connections,
            connect_timeout_secs = self.connect_timeout_secs,
            acquire_timeout_secs = self.acquire_timeout_secs,
            "Database pool configuration"
        );
    }
}

/// Build a deadpool-postgres pool and verify one connection before returning it
pub async fn create_pool(config: DbConfig) -> Result<PgPool, DbPoolError> {
    debug!(
        service = %config.service_name,
        max = config.max_connections,
        "Creating database pool"
    );

    let pg_config: PgConfig = config.database_url.parse()?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(config.max_connections as usize)
        .wait_timeout(Some(Duration::from_secs(config.acquire_timeout_secs)))
        .create_timeout(Some(Duration::from_secs(config.connect_timeout_secs)))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| DbPoolError::Build(e.to_string()))?;

    let verify = async {
        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(PoolError::Backend)?;
        Ok::<(), PoolError>(())
    };

    match tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), verify).await {
        Ok(Ok(())) => {
            info!(
                service = %config.service_name,
                "Database pool created and verified successfully"
            );
            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                service = %config.service_name,
                error = %e,
                "Database connection verification failed"
            );
            Err(DbPoolError::Verify(e))
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            Err(DbPoolError::Timeout(config.connect_timeout_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.acquire_timeout_secs, 10);
        assert!(config.database_url.is_empty());
    }

    #[test]
    #[serial_test::serial]
    fn test_config_from_env_reads_overrides() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("DB_MAX_CONNECTIONS", "7");
        std::env::remove_var("DB_CONNECT_TIMEOUT_SECS");

        let config = DbConfig::from_env("chat-service").unwrap();
        assert_eq!(config.service_name, "chat-service");
        assert_eq!(config.database_url, "postgres://localhost/test");
        assert_eq!(config.max_connections, 7);
        assert_eq!(config.connect_timeout_secs, 5);

        std::env::remove_var("DB_MAX_CONNECTIONS");
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial_test::serial]
    fn test_for_url_applies_overrides_without_database_url() {
        std::env::remove_var("DATABASE_URL");
        std::env::set_var("DB_MAX_CONNECTIONS", "3");
        std::env::set_var("DB_CONNECT_TIMEOUT_SECS", "9");

        let config = DbConfig::for_url("chat-service", "postgres://db/chat");
        assert_eq!(config.database_url, "postgres://db/chat");
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.connect_timeout_secs, 9);
        assert_eq!(config.acquire_timeout_secs, 10);

        std::env::remove_var("DB_MAX_CONNECTIONS");
        std::env::remove_var("DB_CONNECT_TIMEOUT_SECS");
    }

    #[test]
    #[serial_test::serial]
    fn test_config_from_env_requires_url() {
        std::env::remove_var("DATABASE_URL");
        assert!(DbConfig::from_env("chat-service").is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_unparseable_override_falls_back_to_default() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("DB_ACQUIRE_TIMEOUT_SECS", "soon");

        let config = DbConfig::from_env("chat-service").unwrap();
        assert_eq!(config.acquire_timeout_secs, 10);

        std::env::remove_var("DB_ACQUIRE_TIMEOUT_SECS");
        std::env::remove_var("DATABASE_URL");
    }

    #[tokio::test]
    async fn test_create_pool_rejects_malformed_url() {
        let config = DbConfig {
            database_url: "not a url at all ::".to_string(),
            ..DbConfig::default()
        };
        assert!(matches!(
            create_pool(config).await,
            Err(DbPoolError::InvalidUrl(_))
        ));
    }
}
