//! MySQL executor.
//!
//! Pooled connections get `max_execution_time` from the query timeout, UTC
//! session time and, in [`AccessMode::ReadOnly`], a read-only session
//! transaction mode.

use super::{QueryExecutor, bounded, column_count, encode_blob, float_value, is_nullable_flag};
use crate::config::{AccessMode, GateConfig};
use crate::dialect::ConnectionDescriptor;
use crate::error::{Result, SqlWardenError};
use crate::models::{ColumnDescriptor, Dialect, ResultRow, TableSummary};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{MySqlPool, Row};
use std::time::Duration;

/// Pooled MySQL executor.
pub struct MySqlExecutor {
    pool: MySqlPool,
    query_timeout: Duration,
}

impl std::fmt::Debug for MySqlExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlExecutor")
            .field("pool_size", &self.pool.size())
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl MySqlExecutor {
    /// Creates a lazily connecting pool for `descriptor`.
    ///
    /// # Errors
    /// Returns an error if the connection string cannot be parsed.
    pub async fn connect(descriptor: &ConnectionDescriptor, config: &GateConfig) -> Result<Self> {
        use sqlx::Executor;

        let max_execution_ms = config
            .query_timeout
            .as_secs()
            .max(1)
            .saturating_mul(1000);
        let read_only = config.access_mode == AccessMode::ReadOnly;

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.min(100))
            .acquire_timeout(config.connect_timeout)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(format!("SET max_execution_time = {max_execution_ms}").as_str())
                        .await?;

                    if read_only {
                        conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
                    }

                    conn.execute("SET time_zone = '+00:00'").await?;
                    Ok(())
                })
            })
            .connect_lazy(&descriptor.driver_url())
            .map_err(|e| SqlWardenError::Connection {
                context: format!(
                    "Failed to create MySQL connection pool to {}",
                    descriptor.redacted()
                ),
                source: Box::new(e),
            })?;

        Ok(Self::from_pool(pool, config))
    }

    /// Wraps an existing pool.
    pub const fn from_pool(pool: MySqlPool, config: &GateConfig) -> Self {
        Self {
            pool,
            query_timeout: config.query_timeout,
        }
    }
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    async fn test_connection(&self) -> Result<()> {
        let result: i64 = bounded(self.query_timeout, async {
            sqlx::query_scalar("SELECT CAST(1 AS SIGNED)")
                .fetch_one(&self.pool)
                .await
                .map_err(SqlWardenError::connection_failed)
        })
        .await?;

        if result != 1 {
            return Err(SqlWardenError::query_failed(
                "Basic connectivity test failed: unexpected result",
            ));
        }
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableSummary>> {
        let query = Dialect::Mysql.profile().introspection.list_tables;
        let rows = bounded(self.query_timeout, async {
            sqlx::query(query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| SqlWardenError::execution_failed("Failed to list tables", e))
        })
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TableSummary {
                    name: row.try_get("table_name").map_err(|e| {
                        SqlWardenError::execution_failed("Failed to read table name", e)
                    })?,
                    column_count: column_count(row.try_get::<i64, _>("column_count").unwrap_or(0)),
                })
            })
            .collect()
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let query = Dialect::Mysql.profile().introspection.describe_table;
        let rows = bounded(self.query_timeout, async {
            sqlx::query(query)
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    SqlWardenError::execution_failed(format!("Failed to describe table '{table}'"), e)
                })
        })
        .await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("column_name").map_err(|e| {
                    SqlWardenError::execution_failed("Failed to read column name", e)
                })?;
                let data_type: String = row.try_get("data_type").unwrap_or_default();
                let nullable: String = row.try_get("is_nullable").unwrap_or_default();
                Ok(ColumnDescriptor::new(name, data_type, is_nullable_flag(&nullable)))
            })
            .collect()
    }

    async fn fetch_rows(&self, sql: &str) -> Result<Vec<ResultRow>> {
        let rows = bounded(self.query_timeout, async {
            sqlx::query(sql)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| SqlWardenError::execution_failed("Failed to execute query", e))
        })
        .await?;

        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64> {
        let result = bounded(self.query_timeout, async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| SqlWardenError::execution_failed("Failed to execute statement", e))
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_json(row: &MySqlRow) -> ResultRow {
    use sqlx::Column;

    row.columns()
        .iter()
        .map(|column| {
            (
                column.name().to_string(),
                extract_column_value(row, column.ordinal()),
            )
        })
        .collect()
}

/// Extracts a column value, trying types in order of likelihood.
///
/// Temporal values become their display strings and binary values become
/// `base64:` strings. Anything else that the text protocol can carry, such
/// as `DECIMAL`, is read unchecked as a string.
fn extract_column_value(row: &MySqlRow, index: usize) -> JsonValue {
    use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::String);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(JsonValue::Null, |n| JsonValue::Number(n.into()));
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return v.map_or(JsonValue::Null, |n| JsonValue::Number(n.into()));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(JsonValue::Null, float_value);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::Bool);
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
        return v.map_or(JsonValue::Null, |t| JsonValue::String(t.to_rfc3339()));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(index) {
        return v.map_or(JsonValue::Null, |t| JsonValue::String(t.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(index) {
        return v.map_or(JsonValue::Null, |d| JsonValue::String(d.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<NaiveTime>, _>(index) {
        return v.map_or(JsonValue::Null, |t| JsonValue::String(t.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map_or(JsonValue::Null, |bytes| encode_blob(&bytes));
    }
    if let Ok(v) = row.try_get_unchecked::<Option<String>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::String);
    }

    JsonValue::Null
}
