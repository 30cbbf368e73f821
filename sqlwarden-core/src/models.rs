//! Core data models shared by the gate, rewriter and synthesizer.
//!
//! All values are created per request and owned by the caller; nothing in
//! this module is cached or mutated after construction except through the
//! explicit builder methods on [`SchemaContext`].

use crate::error::{Result, SqlWardenError};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgresql,
    Mysql,
    Sqlite,
    Mssql,
}

impl Dialect {
    /// All dialects in detection priority order.
    pub const ALL: [Self; 4] = [Self::Postgresql, Self::Mysql, Self::Sqlite, Self::Mssql];

    /// Lowercase tag used in configuration and output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Mssql => "mssql",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = SqlWardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Self::Postgresql),
            "mysql" => Ok(Self::Mysql),
            "sqlite" => Ok(Self::Sqlite),
            "mssql" | "sqlserver" => Ok(Self::Mssql),
            other => Err(SqlWardenError::configuration(format!(
                "unknown dialect '{other}' (expected postgresql, mysql, sqlite or mssql)"
            ))),
        }
    }
}

/// Maximum number of rows a rewritten query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RowCap(NonZeroU32);

impl RowCap {
    /// Default cap applied when the caller does not request one
    pub const DEFAULT: Self = Self(NonZeroU32::MIN.saturating_add(49));

    /// Creates a row cap, rejecting zero.
    ///
    /// # Errors
    /// Returns a configuration error when `rows` is zero
    pub fn new(rows: u32) -> Result<Self> {
        NonZeroU32::new(rows)
            .map(Self)
            .ok_or_else(|| SqlWardenError::configuration("row cap must be greater than 0"))
    }

    /// The cap as a plain integer.
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for RowCap {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for RowCap {
    type Error = SqlWardenError;

    fn try_from(rows: u32) -> Result<Self> {
        Self::new(rows)
    }
}

impl From<RowCap> for u32 {
    fn from(cap: RowCap) -> Self {
        cap.get()
    }
}

impl std::fmt::Display for RowCap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Column metadata as reported by the introspection collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Dialect-native type name, e.g. `character varying` or `NVARCHAR`
    pub data_type: String,
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }
}

/// A table and its columns in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Known tables in discovery order, with unique names.
///
/// # Example
/// ```rust
/// use sqlwarden_core::models::{ColumnDescriptor, SchemaContext};
///
/// let schema = SchemaContext::new()
///     .with_table("customers", vec![ColumnDescriptor::new("id", "integer", false)])
///     .with_table("orders", vec![]);
///
/// assert_eq!(schema.first_table(), Some("customers"));
/// assert!(schema.contains("orders"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<TableSchema>", into = "Vec<TableSchema>")]
pub struct SchemaContext {
    tables: Vec<TableSchema>,
}

impl SchemaContext {
    pub const fn new() -> Self {
        Self { tables: Vec::new() }
    }

    /// Adds a table, replacing the columns of an existing entry in place so
    /// that discovery order is preserved.
    pub fn insert(&mut self, name: impl Into<String>, columns: Vec<ColumnDescriptor>) {
        let name = name.into();
        match self.tables.iter_mut().find(|table| table.name == name) {
            Some(existing) => existing.columns = columns,
            None => self.tables.push(TableSchema { name, columns }),
        }
    }

    /// Builder form of [`SchemaContext::insert`].
    pub fn with_table(mut self, name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        self.insert(name, columns);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Name of the first discovered table.
    pub fn first_table(&self) -> Option<&str> {
        self.tables.first().map(|table| table.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.iter().any(|table| table.name == name)
    }

    pub fn columns(&self, name: &str) -> Option<&[ColumnDescriptor]> {
        self.tables
            .iter()
            .find(|table| table.name == name)
            .map(|table| table.columns.as_slice())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.iter()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|table| table.name.as_str())
    }
}

impl FromIterator<TableSchema> for SchemaContext {
    fn from_iter<I: IntoIterator<Item = TableSchema>>(iter: I) -> Self {
        let mut schema = Self::new();
        for table in iter {
            schema.insert(table.name, table.columns);
        }
        schema
    }
}

impl From<Vec<TableSchema>> for SchemaContext {
    fn from(tables: Vec<TableSchema>) -> Self {
        tables.into_iter().collect()
    }
}

impl From<SchemaContext> for Vec<TableSchema> {
    fn from(schema: SchemaContext) -> Self {
        schema.tables
    }
}

/// Summary row returned by table listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub column_count: u64,
}

/// A query that passed the gate and carries its row bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedQuery {
    /// Text as supplied (or synthesized) before rewriting
    pub original: String,
    /// Text handed to the executor
    pub rewritten: String,
    pub dialect: Dialect,
    pub row_cap: RowCap,
}

/// One result row, keyed by column name in select-list order
pub type ResultRow = serde_json::Map<String, serde_json::Value>;

/// Rows returned by a bounded read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// The rewritten SQL that was executed
    pub sql: String,
    pub rows: Vec<ResultRow>,
    pub row_count: usize,
}

impl QueryOutcome {
    pub fn new(sql: impl Into<String>, rows: Vec<ResultRow>) -> Self {
        Self {
            sql: sql.into(),
            row_count: rows.len(),
            rows,
        }
    }
}

/// Result of an unrestricted statement run outside the read-only gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementOutcome {
    pub sql: String,
    pub rows_affected: u64,
}

/// Either kind of outcome produced by [`crate::gate::QueryGate::run_statement`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Rows(QueryOutcome),
    Modification(StatementOutcome),
}
