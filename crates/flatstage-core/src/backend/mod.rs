//! Backend-agnostic query execution
//!
//! One trait, one implementation per supported relational backend. The
//! backend is selected once at process start from [`StageConfig`] and
//! threaded through every component that issues queries as an
//! `Arc<dyn QueryBackend>`; nothing downstream knows which engine it is
//! talking to. Query failures propagate unmodified; the adapter performs
//! no retries.
//!
//! [`StageConfig`]: crate::config::StageConfig

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::config::DatabaseConfig;
use crate::resultset::ResultSet;
use async_trait::async_trait;
use flatstage_common::{Result, StageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use mysql::MySqlBackend;
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

/// The supported relational backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
    MySql,
    Sqlite,
}

impl std::str::FromStr for BackendKind {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(BackendKind::Postgres),
            "mysql" | "mariadb" => Ok(BackendKind::MySql),
            "sqlite" | "sqlite3" => Ok(BackendKind::Sqlite),
            _ => Err(StageError::config(format!(
                "unknown backend '{}' (expected postgres, mysql, or sqlite)",
                s
            ))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Postgres => write!(f, "postgres"),
            BackendKind::MySql => write!(f, "mysql"),
            BackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Uniform query execution over one configured backend
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Which engine this adapter talks to
    fn kind(&self) -> BackendKind;

    /// Execute a query and collect its full result set.
    ///
    /// Column names are reported even for empty results, so callers can
    /// resolve positions by name before any rows arrive.
    async fn execute(&self, sql: &str) -> Result<ResultSet>;

    /// Execute a statement (DDL/DML) and report the affected row count.
    async fn run(&self, sql: &str) -> Result<u64>;
}

/// Connect the configured backend once, at the composition root.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn QueryBackend>> {
    let backend: Arc<dyn QueryBackend> = match config.backend {
        BackendKind::Postgres => Arc::new(PostgresBackend::connect(config).await?),
        BackendKind::MySql => Arc::new(MySqlBackend::connect(config).await?),
        BackendKind::Sqlite => Arc::new(SqliteBackend::connect(config).await?),
    };
    tracing::info!(backend = %config.backend, "database backend connected");
    Ok(backend)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("postgres".parse::<BackendKind>().unwrap(), BackendKind::Postgres);
        assert_eq!("PostgreSQL".parse::<BackendKind>().unwrap(), BackendKind::Postgres);
        assert_eq!("mariadb".parse::<BackendKind>().unwrap(), BackendKind::MySql);
        assert_eq!("sqlite3".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert!("oracle".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_display_round_trips() {
        for kind in [BackendKind::Postgres, BackendKind::MySql, BackendKind::Sqlite] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }
}
