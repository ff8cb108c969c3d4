//! Configure-once provider registry.
//!
//! The registry is an explicit value constructed at process start and
//! passed to the facade; there is no global state. It holds the backend
//! configuration for the process lifetime and hands out a fresh, connected
//! provider for every logical operation.

use std::sync::OnceLock;

use crate::config::LoggingConfig;
use crate::provider::{build_provider, LogProvider};
use crate::{Error, Result};

/// Holds the backend configuration, set at most once, and builds a new
/// provider handle per operation.
///
/// `get_instance` is a factory, not a pooled singleton: every call opens
/// its own connection scope, so no connection state leaks between
/// operations.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    config: OnceLock<LoggingConfig>,
}

impl ProviderRegistry {
    /// Create an unconfigured registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry configured in one step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the configuration is invalid.
    pub fn with_config(config: LoggingConfig) -> Result<Self> {
        let registry = Self::new();
        registry.configure(config)?;
        Ok(registry)
    }

    /// Install the backend configuration. Validation runs before anything
    /// is stored, so a rejected configuration leaves the registry
    /// unconfigured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConfigured`] on a second call, or
    /// [`Error::Configuration`] if a required parameter is missing.
    pub fn configure(&self, config: LoggingConfig) -> Result<()> {
        config.validate()?;
        self.config.set(config).map_err(|_| Error::AlreadyConfigured)
    }

    /// Whether a configuration has been installed.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config.get().is_some()
    }

    /// Build, connect, and initialize a fresh provider handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the registry is unconfigured,
    /// or [`Error::Storage`] if the backend cannot be reached.
    pub async fn get_instance(&self) -> Result<Box<dyn LogProvider>> {
        let config = self.config.get().ok_or_else(|| {
            Error::Configuration("logging registry is not configured".to_string())
        })?;
        let mut provider = build_provider(config)?;
        provider.init().await?;
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RedisConfig, SqliteConfig};

    fn sqlite_config() -> LoggingConfig {
        LoggingConfig::sqlite(SqliteConfig {
            path: "sqlite::memory:".to_string(),
        })
    }

    #[test]
    fn test_configure_twice_fails() {
        let registry = ProviderRegistry::new();
        registry.configure(sqlite_config()).unwrap();

        let err = registry
            .configure(LoggingConfig::redis(RedisConfig {
                host: "localhost".to_string(),
                port: 6379,
            }))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyConfigured));
    }

    #[test]
    fn test_invalid_config_leaves_registry_unconfigured() {
        let registry = ProviderRegistry::new();
        let err = registry
            .configure(LoggingConfig::sqlite(SqliteConfig {
                path: String::new(),
            }))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(!registry.is_configured());

        // A valid configuration is still accepted afterwards.
        registry.configure(sqlite_config()).unwrap();
        assert!(registry.is_configured());
    }

    #[tokio::test]
    async fn test_get_instance_requires_configuration() {
        let registry = ProviderRegistry::new();
        let err = registry.get_instance().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_get_instance_returns_fresh_handles() {
        let registry = ProviderRegistry::with_config(sqlite_config()).unwrap();

        let mut first = registry.get_instance().await.unwrap();
        let mut second = registry.get_instance().await.unwrap();

        first.close().await.unwrap();
        // The second handle has its own connection scope.
        assert!(second.get_run_info(10, None).await.is_ok());
        second.close().await.unwrap();
    }
}
