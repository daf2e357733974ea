//! Configuration management

use crate::backend::BackendKind;
use flatstage_common::{Result, StageError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Engine Configuration Constants
// ============================================================================

/// Default database backend.
pub const DEFAULT_BACKEND: BackendKind = BackendKind::Postgres;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/flatstage";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default directory for staged output files and checksum files.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default key-range width per extraction chunk. Deliberately small:
/// memory safety beats throughput as the out-of-the-box behavior.
pub const DEFAULT_CHUNK_SIZE: i64 = 10_000;

/// Default number of rows buffered per output file before a flush.
pub const DEFAULT_CACHE_SIZE: usize = 5_000;

/// Default hard limit on advisory lock acquisition, in seconds.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 300;

/// Default interval between lock acquisition attempts, in seconds.
pub const DEFAULT_LOCK_POLL_SECS: u64 = 5;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub database: DatabaseConfig,
    pub staging: StagingConfig,
    pub lock: LockConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: BackendKind,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Staging output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    pub data_dir: PathBuf,
    pub chunk_size: i64,
    pub cache_size: usize,
}

/// Advisory lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    pub timeout_secs: u64,
    pub poll_secs: u64,
}

impl StageConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = StageConfig {
            database: DatabaseConfig {
                backend: match std::env::var("STAGE_BACKEND") {
                    Ok(s) => s.parse()?,
                    Err(_) => DEFAULT_BACKEND,
                },
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: std::env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
            staging: StagingConfig {
                data_dir: std::env::var("STAGE_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
                chunk_size: std::env::var("STAGE_CHUNK_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CHUNK_SIZE),
                cache_size: std::env::var("STAGE_CACHE_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CACHE_SIZE),
            },
            lock: LockConfig {
                timeout_secs: std::env::var("STAGE_LOCK_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LOCK_TIMEOUT_SECS),
                poll_secs: std::env::var("STAGE_LOCK_POLL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LOCK_POLL_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(StageError::config("database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(StageError::config(
                "DATABASE_MAX_CONNECTIONS must be greater than 0",
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(StageError::config(format!(
                "DATABASE_MIN_CONNECTIONS ({}) cannot be greater than DATABASE_MAX_CONNECTIONS ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.staging.chunk_size <= 0 {
            return Err(StageError::config(
                "STAGE_CHUNK_SIZE must be greater than 0",
            ));
        }

        if self.staging.cache_size == 0 {
            return Err(StageError::config(
                "STAGE_CACHE_SIZE must be greater than 0",
            ));
        }

        if self.lock.poll_secs == 0 || self.lock.poll_secs > self.lock.timeout_secs {
            return Err(StageError::config(format!(
                "STAGE_LOCK_POLL ({}) must be nonzero and no larger than STAGE_LOCK_TIMEOUT ({})",
                self.lock.poll_secs, self.lock.timeout_secs
            )));
        }

        Ok(())
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                backend: DEFAULT_BACKEND,
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            staging: StagingConfig {
                data_dir: PathBuf::from(DEFAULT_DATA_DIR),
                chunk_size: DEFAULT_CHUNK_SIZE,
                cache_size: DEFAULT_CACHE_SIZE,
            },
            lock: LockConfig {
                timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
                poll_secs: DEFAULT_LOCK_POLL_SECS,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(StageConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = StageConfig::default();
        config.staging.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_longer_than_timeout_rejected() {
        let mut config = StageConfig::default();
        config.lock.timeout_secs = 2;
        config.lock.poll_secs = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_connections_above_max_rejected() {
        let mut config = StageConfig::default();
        config.database.min_connections = 10;
        config.database.max_connections = 2;
        assert!(config.validate().is_err());
    }
}
