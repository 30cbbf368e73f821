//! Database executors.
//!
//! An executor runs already-gated SQL and performs schema introspection for
//! one connection. Executors are explicit handles: the caller creates one
//! with [`connect`], passes it into every gate call and closes it when done.
//!
//! # Module Structure
//! - `postgres`, `mysql`, `sqlite`: pooled `sqlx` executors
//! - `mssql`: `tiberius` executor opening one client per call
//!
//! Each driver is behind a cargo feature of the same name.

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgresql")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::config::GateConfig;
use crate::dialect::ConnectionDescriptor;
use crate::error::{Result, SqlWardenError};
use crate::models::{ColumnDescriptor, Dialect, ResultRow, SchemaContext, TableSummary};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::time::Duration;

/// Runs SQL against one database.
///
/// Implementations never classify or rewrite SQL themselves; the gate does
/// that before calling [`QueryExecutor::fetch_rows`]. Every call is bounded
/// by the configured query timeout.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Dialect of the connected database.
    fn dialect(&self) -> Dialect;

    /// Runs a trivial query to prove the connection works.
    async fn test_connection(&self) -> Result<()>;

    /// User tables with their column counts, in discovery order.
    async fn list_tables(&self) -> Result<Vec<TableSummary>>;

    /// Columns of `table` in declaration order. An unknown table yields an
    /// empty list.
    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Runs a row-returning statement.
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<ResultRow>>;

    /// Runs a statement for its side effects and returns the affected row
    /// count.
    async fn execute_statement(&self, sql: &str) -> Result<u64>;

    /// Releases pooled connections.
    async fn close(&self) {}
}

/// Opens an executor for `descriptor`.
///
/// # Errors
/// Returns an error if the configuration is invalid, the connection cannot
/// be established, or the dialect's driver is not compiled in.
pub async fn connect(
    descriptor: &ConnectionDescriptor,
    config: &GateConfig,
) -> Result<Box<dyn QueryExecutor>> {
    config.validate()?;
    tracing::info!("Connecting to {}", descriptor);

    match descriptor.dialect() {
        #[cfg(feature = "postgresql")]
        Dialect::Postgresql => {
            let executor = postgres::PostgresExecutor::connect(descriptor, config).await?;
            Ok(Box::new(executor))
        }
        #[cfg(feature = "mysql")]
        Dialect::Mysql => {
            let executor = mysql::MySqlExecutor::connect(descriptor, config).await?;
            Ok(Box::new(executor))
        }
        #[cfg(feature = "sqlite")]
        Dialect::Sqlite => {
            let executor = sqlite::SqliteExecutor::connect(descriptor, config).await?;
            Ok(Box::new(executor))
        }
        #[cfg(feature = "mssql")]
        Dialect::Mssql => {
            let executor = mssql::MssqlExecutor::connect(descriptor, config).await?;
            Ok(Box::new(executor))
        }
        #[allow(unreachable_patterns)]
        dialect => Err(SqlWardenError::unsupported_feature(
            format!("{dialect} executor (compile with --features {})", feature_name(dialect)),
            dialect.as_str(),
        )),
    }
}

const fn feature_name(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgresql => "postgresql",
        Dialect::Mysql => "mysql",
        Dialect::Sqlite => "sqlite",
        Dialect::Mssql => "mssql",
    }
}

/// Lists tables and describes each, preserving discovery order.
///
/// # Errors
/// Propagates the first introspection failure.
pub async fn load_schema_context(executor: &dyn QueryExecutor) -> Result<SchemaContext> {
    let tables = executor.list_tables().await?;
    let mut schema = SchemaContext::new();

    for table in tables {
        let columns = executor.describe_table(&table.name).await?;
        schema.insert(table.name, columns);
    }

    tracing::debug!("Loaded schema context with {} tables", schema.len());
    Ok(schema)
}

/// Bounds `operation` by `timeout`.
pub(crate) async fn bounded<T, F>(timeout: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| SqlWardenError::Timeout {
            seconds: timeout.as_secs(),
        })?
}

/// Interprets an introspection `is_nullable` value.
pub(crate) fn is_nullable_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("YES")
}

/// Converts an introspection column count, clamping negatives to zero.
pub(crate) fn column_count(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

/// Encodes binary data as a `base64:`-prefixed JSON string.
pub(crate) fn encode_blob(bytes: &[u8]) -> JsonValue {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    JsonValue::String(format!("base64:{encoded}"))
}

/// Converts a float, mapping NaN and infinities to null.
pub(crate) fn float_value(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_flag() {
        assert!(is_nullable_flag("YES"));
        assert!(is_nullable_flag(" yes "));
        assert!(!is_nullable_flag("NO"));
        assert!(!is_nullable_flag(""));
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(column_count(-1), 0);
        assert_eq!(column_count(7), 7);
        assert_eq!(encode_blob(b"hi"), JsonValue::String("base64:aGk=".to_string()));
        assert_eq!(float_value(f64::NAN), JsonValue::Null);
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(SqlWardenError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded(Duration::from_secs(1), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
