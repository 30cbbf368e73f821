//! The query gate.
//!
//! [`QueryGate`] is the single path from agent-supplied text to an executor:
//! classify, rewrite with a row cap, then hand the rewritten text to the
//! executor the caller passes in. Rejections surface as
//! [`SqlWardenError::UnsafeQuery`] and are never retried or corrected.
//!
//! # Example
//! ```rust
//! use sqlwarden_core::config::GateConfig;
//! use sqlwarden_core::gate::QueryGate;
//! use sqlwarden_core::models::Dialect;
//!
//! let gate = QueryGate::new(Dialect::Mssql, GateConfig::default());
//! let prepared = gate.prepare_sql("SELECT * FROM customers", Some(3)).unwrap();
//! assert_eq!(
//!     prepared.rewritten,
//!     "SELECT TOP 3 * FROM (SELECT * FROM customers) AS _sub"
//! );
//!
//! assert!(gate.prepare_sql("DELETE FROM customers", None).is_err());
//! ```

use crate::config::{AccessMode, GateConfig};
use crate::error::Result;
use crate::executor::{QueryExecutor, load_schema_context};
use crate::limit;
use crate::models::{
    Dialect, ExecutionOutcome, PreparedQuery, QueryOutcome, SchemaContext, StatementOutcome,
};
use crate::safety::{self, SafetyVerdict};
use crate::synth::NlSynthesizer;

/// Rows returned by [`QueryGate::sample_table`] when no count is given.
pub const DEFAULT_SAMPLE_ROWS: u32 = 5;

/// Largest sample [`QueryGate::sample_table`] will return.
pub const MAX_SAMPLE_ROWS: u32 = 50;

/// Classifier, rewriter and synthesizer bound to one dialect.
#[derive(Debug)]
pub struct QueryGate {
    dialect: Dialect,
    config: GateConfig,
    synthesizer: NlSynthesizer,
}

impl QueryGate {
    /// Gate with the rule-based synthesizer only.
    pub fn new(dialect: Dialect, config: GateConfig) -> Self {
        Self::with_synthesizer(dialect, config, NlSynthesizer::rule_based())
    }

    pub const fn with_synthesizer(
        dialect: Dialect,
        config: GateConfig,
        synthesizer: NlSynthesizer,
    ) -> Self {
        Self {
            dialect,
            config,
            synthesizer,
        }
    }

    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    pub const fn synthesizer(&self) -> &NlSynthesizer {
        &self.synthesizer
    }

    /// Classifies and rewrites `sql`.
    ///
    /// # Errors
    /// Returns `UnsafeQuery` when the classifier rejects the text, or a
    /// configuration error for a zero row cap.
    pub fn prepare_sql(&self, sql: &str, cap: Option<u32>) -> Result<PreparedQuery> {
        let row_cap = self.config.row_cap(cap)?;
        let safe = safety::check(sql)?;
        let prepared = limit::rewrite(&safe, self.dialect, row_cap);
        tracing::debug!("Prepared query: {}", prepared.rewritten);
        Ok(prepared)
    }

    /// Synthesizes SQL for `request` against `schema`, then prepares it.
    ///
    /// # Errors
    /// Returns `NoTablesAvailable` for an empty schema, or any
    /// [`QueryGate::prepare_sql`] error for the synthesized text.
    pub fn prepare_nl(
        &self,
        request: &str,
        schema: &SchemaContext,
        cap: Option<u32>,
    ) -> Result<PreparedQuery> {
        let sql = self.synthesizer.synthesize(request, schema)?;
        self.prepare_sql(&sql, cap)
    }

    /// Builds a bounded `SELECT *` over `table`.
    ///
    /// The table name is quoted for the dialect and the row count is
    /// clamped to [`MAX_SAMPLE_ROWS`].
    ///
    /// # Errors
    /// Returns a configuration error for a zero row count, or `UnsafeQuery`
    /// when the quoted name trips the classifier.
    pub fn prepare_sample(&self, table: &str, rows: Option<u32>) -> Result<PreparedQuery> {
        let rows = rows.unwrap_or(DEFAULT_SAMPLE_ROWS).min(MAX_SAMPLE_ROWS);
        let sql = format!(
            "SELECT * FROM {}",
            self.dialect.profile().quote_identifier(table)
        );
        self.prepare_sql(&sql, Some(rows))
    }

    /// Fetches up to `rows` rows of `table` through the gate.
    ///
    /// # Errors
    /// Returns [`QueryGate::prepare_sample`] errors, then any executor error.
    pub async fn sample_table(
        &self,
        executor: &dyn QueryExecutor,
        table: &str,
        rows: Option<u32>,
    ) -> Result<QueryOutcome> {
        let prepared = self.prepare_sample(table, rows)?;
        self.fetch(executor, prepared).await
    }

    /// Prepares `sql` and fetches its rows.
    ///
    /// # Errors
    /// Returns preparation errors before touching the executor, then any
    /// executor error.
    pub async fn run_sql(
        &self,
        executor: &dyn QueryExecutor,
        sql: &str,
        cap: Option<u32>,
    ) -> Result<QueryOutcome> {
        let prepared = self.prepare_sql(sql, cap)?;
        self.fetch(executor, prepared).await
    }

    /// Introspects the executor's schema, synthesizes SQL for `request` and
    /// fetches its rows.
    ///
    /// # Errors
    /// Returns introspection, synthesis, preparation or executor errors.
    pub async fn run_nl(
        &self,
        executor: &dyn QueryExecutor,
        request: &str,
        cap: Option<u32>,
    ) -> Result<QueryOutcome> {
        let schema = load_schema_context(executor).await?;
        let prepared = self.prepare_nl(request, &schema, cap)?;
        self.fetch(executor, prepared).await
    }

    /// Runs `sql` according to the configured access mode.
    ///
    /// SAFE text always takes the bounded path. In
    /// [`AccessMode::Unrestricted`] anything else runs as a statement without
    /// a row bound; in [`AccessMode::ReadOnly`] it is rejected as in
    /// [`QueryGate::run_sql`].
    ///
    /// # Errors
    /// Returns `UnsafeQuery` in read-only mode, or any executor error.
    pub async fn run_statement(
        &self,
        executor: &dyn QueryExecutor,
        sql: &str,
        cap: Option<u32>,
    ) -> Result<ExecutionOutcome> {
        if self.config.access_mode == AccessMode::ReadOnly {
            return self
                .run_sql(executor, sql, cap)
                .await
                .map(ExecutionOutcome::Rows);
        }

        if let SafetyVerdict::Unsafe { reason } = safety::classify(sql) {
            tracing::warn!("Executing unrestricted statement ({})", reason);
            let statement = limit::prepare_statement(sql, self.dialect);
            let rows_affected = executor.execute_statement(&statement).await?;
            return Ok(ExecutionOutcome::Modification(StatementOutcome {
                sql: statement,
                rows_affected,
            }));
        }

        self.run_sql(executor, sql, cap)
            .await
            .map(ExecutionOutcome::Rows)
    }

    async fn fetch(
        &self,
        executor: &dyn QueryExecutor,
        prepared: PreparedQuery,
    ) -> Result<QueryOutcome> {
        let rows = executor.fetch_rows(&prepared.rewritten).await?;
        tracing::debug!("Query returned {} rows", rows.len());
        Ok(QueryOutcome::new(prepared.rewritten, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlWardenError;
    use crate::models::{ColumnDescriptor, ResultRow, TableSummary};
    use crate::safety::UnsafeReason;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        tables: Vec<&'static str>,
        fetched: Mutex<Vec<String>>,
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        fn dialect(&self) -> Dialect {
            Dialect::Postgresql
        }

        async fn test_connection(&self) -> Result<()> {
            Ok(())
        }

        async fn list_tables(&self) -> Result<Vec<TableSummary>> {
            Ok(self
                .tables
                .iter()
                .map(|name| TableSummary {
                    name: (*name).to_string(),
                    column_count: 1,
                })
                .collect())
        }

        async fn describe_table(&self, _table: &str) -> Result<Vec<ColumnDescriptor>> {
            Ok(vec![ColumnDescriptor::new("id", "integer", false)])
        }

        async fn fetch_rows(&self, sql: &str) -> Result<Vec<ResultRow>> {
            self.fetched.lock().unwrap().push(sql.to_string());
            let mut row = ResultRow::new();
            row.insert("id".to_string(), serde_json::json!(1));
            Ok(vec![row])
        }

        async fn execute_statement(&self, sql: &str) -> Result<u64> {
            self.executed.lock().unwrap().push(sql.to_string());
            Ok(4)
        }
    }

    fn gate(mode: AccessMode) -> QueryGate {
        QueryGate::new(
            Dialect::Postgresql,
            GateConfig::default().with_access_mode(mode),
        )
    }

    #[test]
    fn test_prepare_sql_uses_default_cap() {
        let prepared = gate(AccessMode::ReadOnly)
            .prepare_sql("SELECT * FROM t;", None)
            .unwrap();
        assert_eq!(prepared.original, "SELECT * FROM t;");
        assert_eq!(prepared.rewritten, "SELECT * FROM t LIMIT 50");
        assert_eq!(prepared.row_cap.get(), 50);
    }

    #[test]
    fn test_prepare_sql_rejects_zero_cap() {
        let result = gate(AccessMode::ReadOnly).prepare_sql("SELECT 1", Some(0));
        assert!(matches!(result, Err(SqlWardenError::Configuration { .. })));
    }

    #[test]
    fn test_prepare_nl_bounds_synthesized_sql() {
        let schema = SchemaContext::new()
            .with_table("customers", vec![])
            .with_table("orders", vec![]);
        let prepared = gate(AccessMode::ReadOnly)
            .prepare_nl("show top 5 customers", &schema, Some(3))
            .unwrap();
        assert_eq!(prepared.original, "SELECT * FROM customers LIMIT 5");
        assert_eq!(prepared.rewritten, "SELECT * FROM customers LIMIT 3");
    }

    #[test]
    fn test_prepare_sample_clamps_and_quotes() {
        let gate = gate(AccessMode::ReadOnly);
        assert_eq!(
            gate.prepare_sample("customers", None).unwrap().rewritten,
            "SELECT * FROM \"customers\" LIMIT 5"
        );
        assert_eq!(
            gate.prepare_sample("customers", Some(500)).unwrap().rewritten,
            "SELECT * FROM \"customers\" LIMIT 50"
        );
        assert!(gate.prepare_sample("customers", Some(0)).is_err());

        let mssql = QueryGate::new(Dialect::Mssql, GateConfig::default());
        assert_eq!(
            mssql.prepare_sample("order lines", Some(2)).unwrap().rewritten,
            "SELECT TOP 2 * FROM (SELECT * FROM [order lines]) AS _sub"
        );
    }

    #[tokio::test]
    async fn test_sample_table_fetches_bounded_query() {
        let executor = RecordingExecutor::default();
        let outcome = gate(AccessMode::ReadOnly)
            .sample_table(&executor, "orders", Some(3))
            .await
            .unwrap();

        assert_eq!(outcome.sql, "SELECT * FROM \"orders\" LIMIT 3");
        assert_eq!(
            executor.fetched.lock().unwrap().as_slice(),
            ["SELECT * FROM \"orders\" LIMIT 3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unsafe_sql_never_reaches_executor() {
        let executor = RecordingExecutor::default();
        let result = gate(AccessMode::ReadOnly)
            .run_sql(&executor, "DROP TABLE customers", None)
            .await;

        assert!(matches!(
            result,
            Err(SqlWardenError::UnsafeQuery {
                reason: UnsafeReason::ForbiddenKeyword("DROP")
            })
        ));
        assert!(executor.fetched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_nl_introspects_then_fetches() {
        let executor = RecordingExecutor {
            tables: vec!["customers", "orders"],
            ..RecordingExecutor::default()
        };
        let outcome = gate(AccessMode::ReadOnly)
            .run_nl(&executor, "count all orders", None)
            .await
            .unwrap();

        assert_eq!(outcome.sql, "SELECT COUNT(*) as count FROM orders LIMIT 50");
        assert_eq!(outcome.row_count, 1);
    }

    #[tokio::test]
    async fn test_run_nl_without_tables() {
        let executor = RecordingExecutor::default();
        let result = gate(AccessMode::ReadOnly)
            .run_nl(&executor, "show everything", None)
            .await;
        assert!(matches!(result, Err(SqlWardenError::NoTablesAvailable)));
    }

    #[tokio::test]
    async fn test_run_statement_read_only_rejects_writes() {
        let executor = RecordingExecutor::default();
        let result = gate(AccessMode::ReadOnly)
            .run_statement(&executor, "UPDATE t SET a = 1", None)
            .await;
        assert!(matches!(result, Err(SqlWardenError::UnsafeQuery { .. })));
        assert!(executor.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_statement_unrestricted() {
        let executor = RecordingExecutor::default();
        let gate = gate(AccessMode::Unrestricted);

        let outcome = gate
            .run_statement(&executor, "UPDATE t SET a = 1;", None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Modification(StatementOutcome {
                sql: "UPDATE t SET a = 1".to_string(),
                rows_affected: 4,
            })
        );

        let outcome = gate
            .run_statement(&executor, "SELECT * FROM t", Some(2))
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Rows(ref rows) if rows.sql == "SELECT * FROM t LIMIT 2"));
        assert_eq!(executor.executed.lock().unwrap().len(), 1);
    }
}
