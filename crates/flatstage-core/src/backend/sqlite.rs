//! SQLite backend
//!
//! SQLite types values, not columns, so decoding consults each value's
//! actual storage class rather than the column declaration. This is also
//! the backend the integration tests run end-to-end, via `sqlite::memory:`.

use crate::backend::{BackendKind, QueryBackend};
use crate::config::DatabaseConfig;
use crate::resultset::ResultSet;
use crate::value::Value;
use async_trait::async_trait;
use flatstage_common::{Result, StageError};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use std::time::Duration;

/// Query executor backed by a SQLite connection pool
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Connect a pool using the process-wide database configuration.
    ///
    /// For `sqlite::memory:` URLs the pool must be sized to a single
    /// connection, otherwise every connection sees its own empty database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let columns = match rows.first() {
            Some(row) => row
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            // Empty result: the statement description still names columns.
            None => self
                .pool
                .describe(sql)
                .await?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            decoded.push(decode_row(row)?);
        }
        Ok(ResultSet::new(columns, decoded))
    }

    async fn run(&self, sql: &str) -> Result<u64> {
        Ok(sqlx::query(sql).execute(&self.pool).await?.rows_affected())
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<Value>> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &SqliteRow, idx: usize) -> Result<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let ty = raw.type_info().name().to_uppercase();

    let value = match ty.as_str() {
        "INTEGER" => Value::Int(row.try_get::<i64, _>(idx)?),
        "REAL" | "NUMERIC" => Value::Float(row.try_get::<f64, _>(idx)?),
        "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(idx)?),
        "TEXT" | "DATE" | "TIME" | "DATETIME" => Value::Text(row.try_get::<String, _>(idx)?),
        "BLOB" => Value::Text(hex::encode(row.try_get::<Vec<u8>, _>(idx)?)),
        other => {
            // Last resort: anything with a textual decoding passes through.
            row.try_get::<String, _>(idx)
                .map(Value::Text)
                .map_err(|_| StageError::UnsupportedColumnType {
                    column: row.columns()[idx].name().to_string(),
                    ty: other.to_string(),
                })?
        },
    };
    Ok(value)
}
