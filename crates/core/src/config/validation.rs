//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use crate::crypto::Envelope;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err.to_string())
    }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the encryption key or primary DSN is absent.
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - the encryption key does not decode to 16, 24, or 32 bytes
    /// - a replica DSN is empty
    /// - `max_open_conns` is 0 or smaller than `max_idle_conns`
    /// - `query_timeout_ms` is 0
    /// - the cache is enabled with a zero TTL or timeout
    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self.require_encryption_key()?;
        if let Err(e) = Envelope::from_base64_key(key) {
            return Err(ConfigError::Invalid { field: "encryption_key".into(), reason: e.to_string() });
        }

        if self.db.primary_dsn.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "db.primary_dsn".into(),
                hint: "Set SNIPPETS_DB__PRIMARY_DSN".into(),
            });
        }
        if self.db.replica_dsns.iter().any(|dsn| dsn.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "db.replica_dsns".into(),
                reason: "must not contain empty entries".into(),
            });
        }

        if self.db.max_open_conns == 0 {
            return Err(ConfigError::Invalid {
                field: "db.max_open_conns".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.db.max_idle_conns > self.db.max_open_conns {
            return Err(ConfigError::Invalid {
                field: "db.max_idle_conns".into(),
                reason: "must not exceed db.max_open_conns".into(),
            });
        }
        if self.db.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "db.query_timeout_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.cache.enabled {
            if self.cache.ttl_secs == 0 {
                return Err(ConfigError::Invalid {
                    field: "cache.ttl_secs".into(),
                    reason: "must be greater than 0".into(),
                });
            }
            if self.cache.timeout_ms == 0 {
                return Err(ConfigError::Invalid {
                    field: "cache.timeout_ms".into(),
                    reason: "must be greater than 0".into(),
                });
            }
        }

        if self.db.primary_dsn == ":memory:" && !self.db.replica_dsns.is_empty() {
            tracing::warn!(
                replica_count = self.db.replica_dsns.len(),
                "in-memory primary cannot be replicated; replicas will not see its rows"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;

    const KEY_16: &str = "MTIzNDU2Nzg5MDEyMzQ1Ng==";

    fn valid() -> AppConfig {
        AppConfig {
            encryption_key: Some(KEY_16.into()),
            db: DbConfig { primary_dsn: ":memory:".into(), ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_key() {
        let config = AppConfig { encryption_key: None, ..valid() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "encryption_key"));
    }

    #[test]
    fn test_validate_short_key() {
        // 10 bytes once decoded
        let config = AppConfig { encryption_key: Some("MTIzNDU2Nzg5MA==".into()), ..valid() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "encryption_key"));
    }

    #[test]
    fn test_validate_missing_primary() {
        let mut config = valid();
        config.db.primary_dsn = String::new();
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "db.primary_dsn"));
    }

    #[test]
    fn test_validate_empty_replica() {
        let mut config = valid();
        config.db.replica_dsns = vec!["a.sqlite".into(), " ".into()];
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "db.replica_dsns"));
    }

    #[test]
    fn test_validate_pool_sizes() {
        let mut config = valid();
        config.db.max_open_conns = 0;
        config.db.max_idle_conns = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "db.max_open_conns"));

        let mut config = valid();
        config.db.max_open_conns = 2;
        config.db.max_idle_conns = 3;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "db.max_idle_conns"));
    }

    #[test]
    fn test_validate_zero_ttl_only_matters_when_enabled() {
        let mut config = valid();
        config.cache.ttl_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "cache.ttl_secs"));

        config.cache.enabled = false;
        assert!(config.validate().is_ok());
    }
}
