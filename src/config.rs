//! Backend selection and connection parameters.
//!
//! Configuration is consumed, not owned: callers either build the structs
//! directly or load them from the environment with the `from_env`
//! constructors. Every required parameter is checked before any connection
//! attempt, and a missing one fails with an error naming the variable.

use std::env;

use crate::{Error, Result};

/// Names of the three logical tables/namespaces shared by all backends.
///
/// Relational backends use these as table names; the clustered-KV backend
/// uses them as key prefixes.
#[derive(Debug, Clone)]
pub struct TableNames {
    /// Event log table, or the per-run list key prefix.
    pub logs: String,
    /// Run-info table, or the run-info hash key.
    pub run_info: String,
    /// Throughput sample table, or the throughput sorted-set key.
    pub throughput: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            logs: "logs".to_string(),
            run_info: "run_info".to_string(),
            throughput: "throughput_logs".to_string(),
        }
    }
}

/// Embedded-relational backend parameters.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file path, or a full `sqlite:` URL such as `sqlite::memory:`.
    pub path: String,
}

impl SqliteConfig {
    /// Load the database path from `LOCAL_DB_PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the variable if it is unset.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            path: require_env("LOCAL_DB_PATH")?,
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::Configuration(
                "sqlite database path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Networked-relational backend parameters.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database name.
    pub dbname: String,
    /// Role to connect as.
    pub user: String,
    /// Role password.
    pub password: String,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl PostgresConfig {
    /// Load connection parameters from `POSTGRES_DBNAME`, `POSTGRES_USER`,
    /// `POSTGRES_PASSWORD`, `POSTGRES_HOST` and `POSTGRES_PORT`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the first missing variable,
    /// or describing an unparseable port.
    pub fn from_env() -> Result<Self> {
        let port = require_env("POSTGRES_PORT")?;
        Ok(Self {
            dbname: require_env("POSTGRES_DBNAME")?,
            user: require_env("POSTGRES_USER")?,
            password: require_env("POSTGRES_PASSWORD")?,
            host: require_env("POSTGRES_HOST")?,
            port: port.parse().map_err(|_| {
                Error::Configuration(format!("POSTGRES_PORT is not a valid port: '{port}'"))
            })?,
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("dbname", &self.dbname),
            ("user", &self.user),
            ("password", &self.password),
            ("host", &self.host),
        ] {
            if value.is_empty() {
                return Err(Error::Configuration(format!(
                    "postgres {field} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// Clustered key-value backend parameters.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Cluster host.
    pub host: String,
    /// Cluster port.
    pub port: u16,
}

impl RedisConfig {
    /// Load connection parameters from `REDIS_CLUSTER_IP` and
    /// `REDIS_CLUSTER_PORT`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the first missing variable,
    /// or describing an unparseable port.
    pub fn from_env() -> Result<Self> {
        let port = require_env("REDIS_CLUSTER_PORT")?;
        Ok(Self {
            host: require_env("REDIS_CLUSTER_IP")?,
            port: port.parse().map_err(|_| {
                Error::Configuration(format!("REDIS_CLUSTER_PORT is not a valid port: '{port}'"))
            })?,
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Configuration(
                "redis cluster host must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The chosen storage backend and its parameters.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Embedded relational store (SQLite file or in-memory database).
    Sqlite(SqliteConfig),
    /// Networked relational store.
    Postgres(PostgresConfig),
    /// Clustered key-value store.
    Redis(RedisConfig),
}

/// Complete logging configuration: a backend variant plus table names.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Backend variant and connection parameters.
    pub store: StoreConfig,
    /// Logical table/namespace names.
    pub tables: TableNames,
}

impl LoggingConfig {
    /// Configuration for the embedded-relational backend.
    #[must_use]
    pub fn sqlite(config: SqliteConfig) -> Self {
        Self {
            store: StoreConfig::Sqlite(config),
            tables: TableNames::default(),
        }
    }

    /// Configuration for the networked-relational backend.
    #[must_use]
    pub fn postgres(config: PostgresConfig) -> Self {
        Self {
            store: StoreConfig::Postgres(config),
            tables: TableNames::default(),
        }
    }

    /// Configuration for the clustered key-value backend.
    #[must_use]
    pub fn redis(config: RedisConfig) -> Self {
        Self {
            store: StoreConfig::Redis(config),
            tables: TableNames::default(),
        }
    }

    /// Override the default table/namespace names.
    #[must_use]
    pub fn with_tables(mut self, tables: TableNames) -> Self {
        self.tables = tables;
        self
    }

    /// Check that every required parameter for the chosen backend is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the missing parameter.
    pub fn validate(&self) -> Result<()> {
        match &self.store {
            StoreConfig::Sqlite(config) => config.validate(),
            StoreConfig::Postgres(config) => config.validate(),
            StoreConfig::Redis(config) => config.validate(),
        }
    }
}

fn require_env(var: &str) -> Result<String> {
    env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::Configuration(format!("Environment variable {var} is not set")))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Environment mutation is process-global; serialize the tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_sqlite_empty_path_rejected() {
        let config = LoggingConfig::sqlite(SqliteConfig {
            path: String::new(),
        });
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_postgres_missing_field_names_the_field() {
        let config = LoggingConfig::postgres(PostgresConfig {
            dbname: "logs".to_string(),
            user: String::new(),
            password: "secret".to_string(),
            host: "localhost".to_string(),
            port: 5432,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("user"));
    }

    #[test]
    fn test_redis_empty_host_rejected() {
        let config = LoggingConfig::redis(RedisConfig {
            host: String::new(),
            port: 6379,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_missing_variable_is_named() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("LOCAL_DB_PATH");

        let err = SqliteConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("LOCAL_DB_PATH"));
    }

    #[test]
    fn test_from_env_reads_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("REDIS_CLUSTER_IP", "10.0.0.7");
        env::set_var("REDIS_CLUSTER_PORT", "6379");

        let config = RedisConfig::from_env().unwrap();
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.port, 6379);

        env::remove_var("REDIS_CLUSTER_IP");
        env::remove_var("REDIS_CLUSTER_PORT");
    }

    #[test]
    fn test_from_env_rejects_bad_port() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("REDIS_CLUSTER_IP", "10.0.0.7");
        env::set_var("REDIS_CLUSTER_PORT", "not-a-port");

        let err = RedisConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("REDIS_CLUSTER_PORT"));

        env::remove_var("REDIS_CLUSTER_IP");
        env::remove_var("REDIS_CLUSTER_PORT");
    }

    #[test]
    fn test_default_table_names() {
        let tables = TableNames::default();
        assert_eq!(tables.logs, "logs");
        assert_eq!(tables.run_info, "run_info");
        assert_eq!(tables.throughput, "throughput_logs");
    }
}
