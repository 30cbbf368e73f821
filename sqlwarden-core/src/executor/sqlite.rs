//! SQLite executor.
//!
//! # Connection Modes
//! - File-based: `sqlite+aiosqlite:///relative.db`, `sqlite+aiosqlite:////abs/path.db`
//! - In-memory: `sqlite+aiosqlite:///:memory:` (single pooled connection, so
//!   every call sees the same database)

use super::{QueryExecutor, bounded, column_count, encode_blob, float_value, is_nullable_flag};
use crate::config::{AccessMode, GateConfig};
use crate::dialect::ConnectionDescriptor;
use crate::error::{Result, SqlWardenError};
use crate::models::{ColumnDescriptor, Dialect, ResultRow, TableSummary};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

/// Pooled SQLite executor.
pub struct SqliteExecutor {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl std::fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExecutor")
            .field("pool_size", &self.pool.size())
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl SqliteExecutor {
    /// Opens the database named by `descriptor`.
    ///
    /// File databases are opened read-only in [`AccessMode::ReadOnly`].
    ///
    /// # Errors
    /// Returns an error if the path is invalid or the database cannot be opened.
    pub async fn connect(descriptor: &ConnectionDescriptor, config: &GateConfig) -> Result<Self> {
        let url = descriptor.driver_url();
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(&url).map_err(|e| {
            SqlWardenError::configuration(format!("Invalid SQLite connection string: {e}"))
        })?;
        if !in_memory && config.access_mode == AccessMode::ReadOnly {
            options = options.read_only(true);
        }

        let max_connections = if in_memory { 1 } else { config.max_connections };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await
            .map_err(SqlWardenError::connection_failed)?;

        Ok(Self::from_pool(pool, config))
    }

    /// Wraps an existing pool.
    pub const fn from_pool(pool: SqlitePool, config: &GateConfig) -> Self {
        Self {
            pool,
            query_timeout: config.query_timeout,
        }
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn test_connection(&self) -> Result<()> {
        let result: i32 = bounded(self.query_timeout, async {
            sqlx::query_scalar("SELECT 1")
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
        let query = Dialect::Sqlite.profile().introspection.list_tables;
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
                    name: row.try_get(0).map_err(|e| {
                        SqlWardenError::execution_failed("Failed to read table name", e)
                    })?,
                    column_count: column_count(row.try_get::<i64, _>(1).unwrap_or(0)),
                })
            })
            .collect()
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let query = Dialect::Sqlite.profile().introspection.describe_table;
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
                let name: String = row.try_get(0).map_err(|e| {
                    SqlWardenError::execution_failed("Failed to read column name", e)
                })?;
                let data_type: String = row.try_get(1).unwrap_or_default();
                let nullable: String = row.try_get(2).unwrap_or_default();
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

/// Converts a row to a JSON object in select-list order.
fn row_to_json(row: &SqliteRow) -> ResultRow {
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
fn extract_column_value(row: &SqliteRow, index: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::String);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(JsonValue::Null, |n| JsonValue::Number(n.into()));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(JsonValue::Null, float_value);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::Bool);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map_or(JsonValue::Null, |bytes| encode_blob(&bytes));
    }
    if let Ok(v) = row.try_get_unchecked::<Option<String>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::String);
    }

    JsonValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_executor() -> SqliteExecutor {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteExecutor::from_pool(pool, &GateConfig::default())
    }

    #[tokio::test]
    async fn test_sqlite_row_values() {
        let executor = memory_executor().await;
        let rows = executor
            .fetch_rows("SELECT 'a' AS s, 2 AS i, 1.5 AS f, NULL AS n, x'0102' AS b")
            .await
            .unwrap();

        let row = &rows[0];
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["s", "i", "f", "n", "b"]);
        assert_eq!(row["s"], "a");
        assert_eq!(row["i"], 2);
        assert_eq!(row["f"], 1.5);
        assert_eq!(row["n"], JsonValue::Null);
        assert_eq!(row["b"], "base64:AQI=");
    }

    #[tokio::test]
    async fn test_sqlite_introspection() {
        let executor = memory_executor().await;
        executor
            .execute_statement("CREATE TABLE items (id INTEGER NOT NULL, label TEXT)")
            .await
            .unwrap();

        let tables = executor.list_tables().await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "items");
        assert_eq!(tables[0].column_count, 2);

        let columns = executor.describe_table("items").await.unwrap();
        assert_eq!(columns[0], ColumnDescriptor::new("id", "INTEGER", false));
        assert_eq!(columns[1], ColumnDescriptor::new("label", "TEXT", true));

        assert!(executor.describe_table("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_connect_from_descriptor() {
        let descriptor = crate::dialect::DialectResolver::default().resolve_url("sqlite:///:memory:");
        let executor = SqliteExecutor::connect(&descriptor, &GateConfig::default())
            .await
            .unwrap();
        assert!(executor.test_connection().await.is_ok());
        executor.close().await;
    }
}
