//! Dialect resolution for connection descriptors.
//!
//! A connection is described either by a full URL or by discrete
//! parameters. Both forms are normalized into the async-driver URL
//! convention (`postgresql+asyncpg://`, `mysql+aiomysql://`,
//! `sqlite+aiosqlite://`, `mssql+pyodbc://`) and the dialect is detected
//! from the normalized text. Resolution never fails: anything
//! unrecognizable resolves to postgresql.
//!
//! # Security
//! Connection strings are held in zeroizing buffers and only ever rendered
//! through [`redact_database_url`].

mod profile;

pub use profile::{DialectProfile, IntrospectionQueries};

use crate::config::{ConnectionParams, ConnectionSource, MssqlOptions};
use crate::error::redact_database_url;
use crate::models::Dialect;
use regex::Regex;
use std::sync::OnceLock;
use zeroize::Zeroizing;

/// A resolved connection: the normalized URL and its dialect.
///
/// Fields are private so the dialect cannot change once resolved.
#[derive(Clone)]
pub struct ConnectionDescriptor {
    raw_input: Option<Zeroizing<String>>,
    normalized: Zeroizing<String>,
    dialect: Dialect,
}

impl ConnectionDescriptor {
    /// The URL as supplied, absent when built from discrete parameters.
    pub fn raw_input(&self) -> Option<&str> {
        self.raw_input.as_deref().map(String::as_str)
    }

    /// The normalized async-driver URL. Contains credentials.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Normalized URL with the password masked, safe for logs.
    pub fn redacted(&self) -> String {
        redact_database_url(&self.normalized)
    }

    /// Converts the normalized URL back to the native scheme understood by
    /// the Rust drivers (`postgres://`, `mysql://`, `sqlite://`,
    /// `mssql://`).
    ///
    /// Sqlite paths follow the three-slash convention of the normalized form:
    /// `sqlite+aiosqlite:///data.db` is the relative file `data.db`,
    /// `sqlite+aiosqlite:////var/data.db` the absolute `/var/data.db`.
    pub fn driver_url(&self) -> Zeroizing<String> {
        let normalized = self.normalized.as_str();
        let Some((_, rest)) = normalized.split_once("://") else {
            return Zeroizing::new(normalized.to_string());
        };

        let url = match self.dialect {
            Dialect::Sqlite => {
                let path = rest.strip_prefix('/').unwrap_or(rest);
                if path.is_empty() || path.starts_with(":memory:") {
                    "sqlite::memory:".to_string()
                } else {
                    format!("sqlite://{path}")
                }
            }
            dialect => format!("{}://{rest}", dialect.profile().native_scheme),
        };
        Zeroizing::new(url)
    }
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("from_url", &self.raw_input.is_some())
            .field("normalized", &self.redacted())
            .field("dialect", &self.dialect)
            .finish()
    }
}

impl std::fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.dialect, self.redacted())
    }
}

#[allow(clippy::expect_used)]
fn mssql_scheme_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(mssql|sqlserver)://").expect("Invalid mssql scheme pattern"))
}

/// Detects the dialect of a (normalized) connection string.
///
/// Scans the lower-cased text for `postgresql`/`postgres`, then `mysql`,
/// `sqlite`, `mssql`/`sqlserver`; anything else is postgresql.
///
/// # Example
/// ```rust
/// use sqlwarden_core::dialect::detect_dialect;
/// use sqlwarden_core::models::Dialect;
///
/// assert_eq!(detect_dialect("mysql+aiomysql://sa@db/shop"), Dialect::Mysql);
/// assert_eq!(detect_dialect(""), Dialect::Postgresql);
/// ```
pub fn detect_dialect(connection: &str) -> Dialect {
    let lowered = connection.to_lowercase();
    if lowered.contains("postgresql") || lowered.contains("postgres") {
        Dialect::Postgresql
    } else if lowered.contains("mysql") {
        Dialect::Mysql
    } else if lowered.contains("sqlite") {
        Dialect::Sqlite
    } else if lowered.contains("mssql") || lowered.contains("sqlserver") {
        Dialect::Mssql
    } else {
        Dialect::Postgresql
    }
}

/// Resolves connection sources into [`ConnectionDescriptor`]s.
#[derive(Debug, Clone, Default)]
pub struct DialectResolver {
    mssql: MssqlOptions,
}

impl DialectResolver {
    /// Creates a resolver that applies `mssql` options to SQL Server URLs.
    pub const fn new(mssql: MssqlOptions) -> Self {
        Self { mssql }
    }

    /// Resolves a URL or parameter set. Never fails.
    pub fn resolve(&self, source: &ConnectionSource) -> ConnectionDescriptor {
        let (raw_input, normalized) = match source {
            ConnectionSource::Url(url) => (
                Some(url.clone()),
                Zeroizing::new(self.normalize_url(url)),
            ),
            ConnectionSource::Params(params) => (None, Zeroizing::new(build_url(params))),
        };
        let dialect = detect_dialect(&normalized);

        tracing::debug!(
            "Resolved {} connection: {}",
            dialect,
            redact_database_url(&normalized)
        );

        ConnectionDescriptor {
            raw_input,
            normalized,
            dialect,
        }
    }

    /// Shorthand for resolving a full URL.
    pub fn resolve_url(&self, url: &str) -> ConnectionDescriptor {
        self.resolve(&ConnectionSource::url(url))
    }

    /// Rewrites bare driver schemes to their async-driver forms.
    pub fn normalize_url(&self, url: &str) -> String {
        if let Some(rest) = url.strip_prefix("postgresql://") {
            return format!("postgresql+asyncpg://{rest}");
        }
        if let Some(rest) = url.strip_prefix("mysql://") {
            return format!("mysql+aiomysql://{rest}");
        }
        if mssql_scheme_pattern().is_match(url) {
            return self.normalize_mssql(url);
        }
        if let Some(rest) = url.strip_prefix("sqlite://")
            && !url.contains("+aiosqlite")
        {
            return format!("sqlite+aiosqlite://{rest}");
        }
        url.to_string()
    }

    fn normalize_mssql(&self, url: &str) -> String {
        let mut normalized = mssql_scheme_pattern()
            .replace(url, "mssql+pyodbc://")
            .into_owned();

        if !normalized.contains("driver=") {
            let join = if normalized.contains('?') { '&' } else { '?' };
            normalized.push(join);
            normalized.push_str("driver=");
            normalized.push_str(&self.mssql.driver_param());
        }
        if !normalized.contains("Encrypt=") {
            normalized.push_str("&Encrypt=yes");
        }
        if !normalized.contains("TrustServerCertificate=") {
            normalized.push_str("&TrustServerCertificate=yes");
        }
        normalized
    }
}

/// Builds a normalized URL from discrete parameters.
fn build_url(params: &ConnectionParams) -> String {
    let db_type = params.db_type.trim().to_lowercase();
    match db_type.as_str() {
        "sqlite" => match params.database.as_deref() {
            Some(database) if !database.is_empty() && !matches!(database, "sqlite" | "memory") => {
                format!("sqlite+aiosqlite:///{database}")
            }
            _ => "sqlite+aiosqlite:///:memory:".to_string(),
        },
        "mysql" => server_url(params, Dialect::Mysql),
        "mssql" | "sqlserver" => {
            let mut url = server_url(params, Dialect::Mssql);
            url.push_str(&format!(
                "?driver={}&Encrypt={}&TrustServerCertificate={}",
                params.mssql.driver_param(),
                params.mssql.encrypt,
                params.mssql.trust_server_certificate
            ));
            url
        }
        "postgresql" | "postgres" => server_url(params, Dialect::Postgresql),
        other => {
            tracing::debug!("Unknown database type '{}', using postgresql", other);
            server_url(params, Dialect::Postgresql)
        }
    }
}

/// Builds `<scheme>://[user[:password]@]host:port/database` with
/// percent-encoded credentials.
fn server_url(params: &ConnectionParams, dialect: Dialect) -> String {
    let profile = dialect.profile();
    let (default_user, default_database) = match dialect {
        Dialect::Postgresql => ("postgres", "postgres"),
        _ => ("sa", "master"),
    };
    let user = params.user.as_deref().unwrap_or(default_user);
    let database = params.database.as_deref().unwrap_or(default_database);
    let port = params
        .port
        .or(profile.default_port)
        .map(|port| format!(":{port}"))
        .unwrap_or_default();

    let base = format!("{}://{}{port}/{database}", profile.async_scheme, params.host);
    let password = params.password.as_deref().map(String::as_str);

    match url::Url::parse(&base) {
        Ok(mut url) if url.has_host() => {
            let credentials_set = url.set_username(user).is_ok()
                && password.is_none_or(|password| url.set_password(Some(password)).is_ok());
            if credentials_set {
                return url.to_string();
            }
            fallback_server_url(profile.async_scheme, user, password, &params.host, &port, database)
        }
        _ => fallback_server_url(profile.async_scheme, user, password, &params.host, &port, database),
    }
}

fn fallback_server_url(
    scheme: &str,
    user: &str,
    password: Option<&str>,
    host: &str,
    port: &str,
    database: &str,
) -> String {
    match password {
        Some(password) => format!("{scheme}://{user}:{password}@{host}{port}/{database}"),
        None => format!("{scheme}://{user}@{host}{port}/{database}"),
    }
}
