//! Per-dialect strategy table.
//!
//! Everything that varies by dialect lives in one static [`DialectProfile`]
//! entry: the async driver scheme used in normalized connection strings,
//! the default port, the row-bound detector and applier, and the
//! introspection queries. Callers look a profile up once by [`Dialect`]
//! instead of branching on the dialect at each use site.

use crate::limit::{self, LimitClause};
use crate::models::{Dialect, RowCap};

/// Schema introspection query text for one dialect.
///
/// `list_tables` returns `(name, column_count)` rows in discovery order.
/// `describe_table` takes the table name as its only bound parameter and
/// returns `(name, data_type, is_nullable)` rows where `is_nullable` is
/// `'YES'` or `'NO'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrospectionQueries {
    pub list_tables: &'static str,
    pub describe_table: &'static str,
}

/// Static description of how a dialect is handled.
#[derive(Debug, Clone, Copy)]
pub struct DialectProfile {
    pub dialect: Dialect,
    /// Scheme used in normalized connection strings
    pub async_scheme: &'static str,
    /// Native scheme accepted by the Rust driver
    pub native_scheme: &'static str,
    pub default_port: Option<u16>,
    /// Whether `\` escapes the next character inside quoted literals
    pub backslash_escapes: bool,
    /// Opening and closing delimiters of a quoted identifier
    pub identifier_quotes: (char, char),
    pub detect_limit: fn(&str, bool) -> LimitClause,
    pub apply_limit: fn(&str, &LimitClause, RowCap) -> String,
    pub introspection: IntrospectionQueries,
}

const POSTGRES_LIST_TABLES: &str = r#"
    SELECT
        t.table_name::text AS table_name,
        (SELECT COUNT(*) FROM information_schema.columns c
         WHERE c.table_schema = t.table_schema
         AND c.table_name = t.table_name)::bigint AS column_count
    FROM information_schema.tables t
    WHERE t.table_schema = 'public'
    AND t.table_type = 'BASE TABLE'
    ORDER BY t.table_name
"#;

const POSTGRES_DESCRIBE_TABLE: &str = r#"
    SELECT
        column_name::text AS column_name,
        data_type::text AS data_type,
        is_nullable::text AS is_nullable
    FROM information_schema.columns
    WHERE table_schema = 'public'
    AND table_name = $1
    ORDER BY ordinal_position
"#;

const MYSQL_LIST_TABLES: &str = r#"
    SELECT
        CAST(t.TABLE_NAME AS CHAR) AS table_name,
        CAST((SELECT COUNT(*) FROM INFORMATION_SCHEMA.COLUMNS c
              WHERE c.TABLE_SCHEMA = t.TABLE_SCHEMA
              AND c.TABLE_NAME = t.TABLE_NAME) AS SIGNED) AS column_count
    FROM INFORMATION_SCHEMA.TABLES t
    WHERE t.TABLE_SCHEMA = DATABASE()
    AND t.TABLE_TYPE = 'BASE TABLE'
    ORDER BY t.TABLE_NAME
"#;

const MYSQL_DESCRIBE_TABLE: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(DATA_TYPE AS CHAR) AS data_type,
        CAST(IS_NULLABLE AS CHAR) AS is_nullable
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE()
    AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

const SQLITE_LIST_TABLES: &str = r#"
    SELECT
        m.name AS table_name,
        (SELECT COUNT(*) FROM pragma_table_info(m.name)) AS column_count
    FROM sqlite_master m
    WHERE m.type = 'table'
    AND m.name NOT LIKE 'sqlite_%'
    ORDER BY m.name
"#;

const SQLITE_DESCRIBE_TABLE: &str = r#"
    SELECT
        name AS column_name,
        type AS data_type,
        CASE WHEN "notnull" = 0 THEN 'YES' ELSE 'NO' END AS is_nullable
    FROM pragma_table_info(?)
    ORDER BY cid
"#;

const MSSQL_LIST_TABLES: &str = r#"
    SELECT
        t.name AS table_name,
        CAST(COUNT(c.column_id) AS BIGINT) AS column_count
    FROM sys.tables AS t
    LEFT JOIN sys.columns AS c ON c.object_id = t.object_id
    INNER JOIN sys.schemas AS s ON s.schema_id = t.schema_id
    WHERE s.name NOT IN ('sys')
    GROUP BY t.name
    ORDER BY t.name
"#;

const MSSQL_DESCRIBE_TABLE: &str = r#"
    SELECT
        c.name AS column_name,
        t.name AS data_type,
        CASE WHEN c.is_nullable = 1 THEN 'YES' ELSE 'NO' END AS is_nullable
    FROM sys.columns AS c
    JOIN sys.types AS t ON t.user_type_id = c.user_type_id
    WHERE c.object_id = OBJECT_ID(@P1)
    ORDER BY c.column_id
"#;

static PROFILES: [DialectProfile; 4] = [
    DialectProfile {
        dialect: Dialect::Postgresql,
        async_scheme: "postgresql+asyncpg",
        native_scheme: "postgres",
        default_port: Some(5432),
        identifier_quotes: ('"', '"'),
        backslash_escapes: false,
        detect_limit: limit::detect_limit,
        apply_limit: limit::apply_limit_clause,
        introspection: IntrospectionQueries {
            list_tables: POSTGRES_LIST_TABLES,
            describe_table: POSTGRES_DESCRIBE_TABLE,
        },
    },
    DialectProfile {
        dialect: Dialect::Mysql,
        async_scheme: "mysql+aiomysql",
        native_scheme: "mysql",
        default_port: Some(3306),
        identifier_quotes: ('`', '`'),
        backslash_escapes: true,
        detect_limit: limit::detect_limit,
        apply_limit: limit::apply_limit_clause,
        introspection: IntrospectionQueries {
            list_tables: MYSQL_LIST_TABLES,
            describe_table: MYSQL_DESCRIBE_TABLE,
        },
    },
    DialectProfile {
        dialect: Dialect::Sqlite,
        async_scheme: "sqlite+aiosqlite",
        native_scheme: "sqlite",
        default_port: None,
        identifier_quotes: ('"', '"'),
        backslash_escapes: false,
        detect_limit: limit::detect_limit,
        apply_limit: limit::apply_limit_clause,
        introspection: IntrospectionQueries {
            list_tables: SQLITE_LIST_TABLES,
            describe_table: SQLITE_DESCRIBE_TABLE,
        },
    },
    DialectProfile {
        dialect: Dialect::Mssql,
        async_scheme: "mssql+pyodbc",
        native_scheme: "mssql",
        default_port: Some(1433),
        identifier_quotes: ('[', ']'),
        backslash_escapes: false,
        detect_limit: limit::detect_top,
        apply_limit: limit::apply_top_clause,
        introspection: IntrospectionQueries {
            list_tables: MSSQL_LIST_TABLES,
            describe_table: MSSQL_DESCRIBE_TABLE,
        },
    },
];

impl DialectProfile {
    /// Looks up the static profile for `dialect`.
    pub fn for_dialect(dialect: Dialect) -> &'static Self {
        match dialect {
            Dialect::Postgresql => &PROFILES[0],
            Dialect::Mysql => &PROFILES[1],
            Dialect::Sqlite => &PROFILES[2],
            Dialect::Mssql => &PROFILES[3],
        }
    }

    /// All profiles in detection priority order.
    pub fn all() -> &'static [Self] {
        &PROFILES
    }

    /// Quotes `name` as an identifier, doubling any closing delimiter.
    pub fn quote_identifier(&self, name: &str) -> String {
        let (open, close) = self.identifier_quotes;
        let escaped = name.replace(close, &format!("{close}{close}"));
        format!("{open}{escaped}{close}")
    }

    /// Whether this dialect bounds rows with `TOP` rather than `LIMIT`.
    pub const fn uses_top(&self) -> bool {
        matches!(self.dialect, Dialect::Mssql)
    }
}

impl Dialect {
    /// Shorthand for [`DialectProfile::for_dialect`].
    pub fn profile(self) -> &'static DialectProfile {
        DialectProfile::for_dialect(self)
    }
}
