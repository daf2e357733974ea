//! PostgreSQL backend
//!
//! Note that PostgreSQL lower-cases unquoted identifiers, so the column
//! names reported here may not match the casing a job's query used; the
//! case-insensitive fallback in `ResultSet::column_number` absorbs that at
//! the adapter boundary.

use crate::backend::{BackendKind, QueryBackend};
use crate::config::DatabaseConfig;
use crate::resultset::ResultSet;
use crate::value::Value;
use async_trait::async_trait;
use flatstage_common::{Result, StageError};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use std::time::Duration;

/// Query executor backed by a PostgreSQL connection pool
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect a pool using the process-wide database configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
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

fn decode_row(row: &PgRow) -> Result<Vec<Value>> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &PgRow, idx: usize) -> Result<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let column = &row.columns()[idx];
    let ty = column.type_info().name().to_uppercase();
    let value = match ty.as_str() {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(idx)?),
        "INT2" => Value::Int(i64::from(row.try_get::<i16, _>(idx)?)),
        "INT4" => Value::Int(i64::from(row.try_get::<i32, _>(idx)?)),
        "INT8" => Value::Int(row.try_get::<i64, _>(idx)?),
        "FLOAT4" => Value::Float(f64::from(row.try_get::<f32, _>(idx)?)),
        "FLOAT8" => Value::Float(row.try_get::<f64, _>(idx)?),
        "NUMERIC" => Value::Text(row.try_get::<sqlx::types::BigDecimal, _>(idx)?.to_string()),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            Value::Text(row.try_get::<String, _>(idx)?)
        },
        "UUID" => Value::Text(row.try_get::<sqlx::types::Uuid, _>(idx)?.to_string()),
        "DATE" => Value::Text(row.try_get::<chrono::NaiveDate, _>(idx)?.to_string()),
        "TIME" => Value::Text(row.try_get::<chrono::NaiveTime, _>(idx)?.to_string()),
        "TIMESTAMP" => Value::Text(row.try_get::<chrono::NaiveDateTime, _>(idx)?.to_string()),
        "TIMESTAMPTZ" => Value::Text(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)?
                .to_rfc3339(),
        ),
        "JSON" | "JSONB" => Value::Text(row.try_get::<serde_json::Value, _>(idx)?.to_string()),
        "BYTEA" => Value::Text(hex::encode(row.try_get::<Vec<u8>, _>(idx)?)),
        other => {
            // Last resort: anything with a textual decoding passes through.
            row.try_get::<String, _>(idx)
                .map(Value::Text)
                .map_err(|_| StageError::UnsupportedColumnType {
                    column: column.name().to_string(),
                    ty: other.to_string(),
                })?
        },
    };
    Ok(value)
}
