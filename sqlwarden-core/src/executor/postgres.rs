//! PostgreSQL executor.
//!
//! # Session Settings
//! Every pooled connection gets `statement_timeout` from the gate
//! configuration and, in [`AccessMode::ReadOnly`], a read-only default
//! transaction mode, so the database itself refuses writes the lexical
//! classifier might miss.
//!
//! Rows are fetched through `row_to_json`, which converts every PostgreSQL
//! type (numerics, timestamps, arrays, json) server-side and keeps
//! select-list order.

use super::{QueryExecutor, bounded, column_count, is_nullable_flag};
use crate::config::{AccessMode, GateConfig};
use crate::dialect::ConnectionDescriptor;
use crate::error::{Result, SqlWardenError};
use crate::models::{ColumnDescriptor, Dialect, ResultRow, TableSummary};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use std::time::Duration;

/// Pooled PostgreSQL executor.
pub struct PostgresExecutor {
    pool: PgPool,
    query_timeout: Duration,
}

impl std::fmt::Debug for PostgresExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresExecutor")
            .field("pool_size", &self.pool.size())
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl PostgresExecutor {
    /// Creates a lazily connecting pool for `descriptor`.
    ///
    /// # Errors
    /// Returns an error if the connection string cannot be parsed.
    pub async fn connect(descriptor: &ConnectionDescriptor, config: &GateConfig) -> Result<Self> {
        use sqlx::Executor;

        let query_timeout_secs = config.query_timeout.as_secs().max(1);
        let read_only = config.access_mode == AccessMode::ReadOnly;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections.min(100))
            .acquire_timeout(config.connect_timeout)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(
                        format!("SET statement_timeout = '{query_timeout_secs}s'").as_str(),
                    )
                    .await?;

                    if read_only {
                        conn.execute("SET default_transaction_read_only = on").await?;
                    }

                    let app_name = format!("sqlwarden-{}", env!("CARGO_PKG_VERSION"));
                    conn.execute(format!("SET application_name = '{app_name}'").as_str())
                        .await?;

                    Ok(())
                })
            })
            .connect_lazy(&descriptor.driver_url())
            .map_err(|e| {
                SqlWardenError::Connection {
                    context: format!(
                        "Failed to create PostgreSQL connection pool to {}",
                        descriptor.redacted()
                    ),
                    source: Box::new(e),
                }
            })?;

        Ok(Self::from_pool(pool, config))
    }

    /// Wraps an existing pool.
    pub const fn from_pool(pool: PgPool, config: &GateConfig) -> Self {
        Self {
            pool,
            query_timeout: config.query_timeout,
        }
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
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
        let query = Dialect::Postgresql.profile().introspection.list_tables;
        let rows = bounded(self.query_timeout, async {
            sqlx::query(query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to list tables: {}", e);
                    match &e {
                        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("42501") => {
                            SqlWardenError::query_failed(
                                "Cannot access information_schema.tables - insufficient privileges",
                            )
                        }
                        _ => SqlWardenError::execution_failed("Failed to list tables", e),
                    }
                })
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
        let query = Dialect::Postgresql.profile().introspection.describe_table;
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
        let wrapped = format!("SELECT row_to_json(_q.*) AS row_data FROM ({sql}) AS _q");
        tracing::trace!("Fetching rows with: {}", wrapped);

        let rows: Vec<JsonValue> = bounded(self.query_timeout, async {
            sqlx::query_scalar(&wrapped)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| SqlWardenError::execution_failed("Failed to execute query", e))
        })
        .await?;

        Ok(rows.into_iter().map(into_row).collect())
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

/// Unwraps a `row_to_json` object; anything else lands under `value`.
fn into_row(value: JsonValue) -> ResultRow {
    match value {
        JsonValue::Object(map) => map,
        other => {
            let mut row = ResultRow::new();
            row.insert("value".to_string(), other);
            row
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_row_unwraps_objects() {
        let row = into_row(serde_json::json!({"id": 1, "name": "a"}));
        assert_eq!(row.len(), 2);
        assert_eq!(row["name"], "a");

        let row = into_row(JsonValue::Null);
        assert_eq!(row["value"], JsonValue::Null);
    }

    #[tokio::test]
    async fn test_connect_is_lazy() {
        let descriptor =
            crate::dialect::DialectResolver::default().resolve_url("postgresql://u:p@127.0.0.1:1/db");
        let executor = PostgresExecutor::connect(&descriptor, &GateConfig::default()).await;
        assert!(executor.is_ok());
    }
}
