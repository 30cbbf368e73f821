//! Connection sources and environment loading.

use crate::dialect::{ConnectionDescriptor, DialectResolver};
use crate::error::redact_database_url;
use zeroize::Zeroizing;

/// ODBC driver named in normalized SQL Server URLs when none is given.
pub const DEFAULT_MSSQL_DRIVER: &str = "ODBC Driver 18 for SQL Server";

/// Environment variables checked for a full connection URL, in order.
pub const URL_ENV_VARS: [&str; 6] = [
    "DATABASE_URL",
    "DB_URL",
    "POSTGRES_URL",
    "MYSQL_URL",
    "MSSQL_URL",
    "SQLSERVER_URL",
];

/// SQL Server specific connection options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MssqlOptions {
    pub driver: String,
    pub encrypt: String,
    pub trust_server_certificate: String,
}

impl Default for MssqlOptions {
    fn default() -> Self {
        Self {
            driver: DEFAULT_MSSQL_DRIVER.to_string(),
            encrypt: "yes".to_string(),
            trust_server_certificate: "yes".to_string(),
        }
    }
}

impl MssqlOptions {
    /// Driver name as a URL query value, spaces written as `+`.
    pub fn driver_param(&self) -> String {
        self.driver.replace(' ', "+")
    }
}

/// Discrete connection parameters.
///
/// # Example
/// ```rust
/// use sqlwarden_core::config::ConnectionParams;
///
/// let params = ConnectionParams::new("mysql")
///     .with_host("db.internal")
///     .with_port(3307)
///     .with_user("reporter")
///     .with_password("s3cret");
///
/// assert!(!format!("{params:?}").contains("s3cret"));
/// ```
#[derive(Clone)]
pub struct ConnectionParams {
    /// Database type tag; unknown values resolve as postgresql
    pub db_type: String,
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub database: Option<String>,
    pub mssql: MssqlOptions,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            db_type: "postgresql".to_string(),
            host: "localhost".to_string(),
            port: None,
            user: None,
            password: None,
            database: None,
            mssql: MssqlOptions::default(),
        }
    }
}

impl ConnectionParams {
    pub fn new(db_type: impl Into<String>) -> Self {
        Self {
            db_type: db_type.into(),
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_mssql_options(mut self, mssql: MssqlOptions) -> Self {
        self.mssql = mssql;
        self
    }
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("database", &self.database)
            .field("mssql", &self.mssql)
            .finish()
    }
}

/// Where a connection comes from.
#[derive(Clone)]
pub enum ConnectionSource {
    /// A full connection URL
    Url(Zeroizing<String>),
    /// Discrete parameters
    Params(ConnectionParams),
}

impl ConnectionSource {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(Zeroizing::new(url.into()))
    }
}

impl std::fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f
                .debug_tuple("Url")
                .field(&redact_database_url(url))
                .finish(),
            Self::Params(params) => f.debug_tuple("Params").field(params).finish(),
        }
    }
}

/// A connection source together with the SQL Server options that apply
/// when normalizing SQL Server URLs.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub source: ConnectionSource,
    pub mssql: MssqlOptions,
}

impl ConnectionSettings {
    pub fn new(source: ConnectionSource) -> Self {
        Self {
            source,
            mssql: MssqlOptions::default(),
        }
    }

    /// Loads settings from the process environment.
    ///
    /// See [`ConnectionSettings::from_lookup`] for the variables consulted.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through `lookup`, treating empty values as unset.
    ///
    /// A URL is taken from the first non-empty of [`URL_ENV_VARS`].
    /// Otherwise discrete parameters come from `DB_TYPE`, `DB_HOST`,
    /// `DB_PORT`, `DB_USER`, `DB_PASSWORD` and `DB_NAME`. SQL Server options
    /// come from `DB_DRIVER`, `DB_ENCRYPT` and `DB_TRUST_SERVER_CERTIFICATE`
    /// in both cases.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let defaults = MssqlOptions::default();
        let mssql = MssqlOptions {
            driver: get("DB_DRIVER").unwrap_or(defaults.driver),
            encrypt: get("DB_ENCRYPT").unwrap_or(defaults.encrypt),
            trust_server_certificate: get("DB_TRUST_SERVER_CERTIFICATE")
                .unwrap_or(defaults.trust_server_certificate),
        };

        if let Some((key, url)) = URL_ENV_VARS
            .iter()
            .find_map(|&key| get(key).map(|url| (key, url)))
        {
            tracing::debug!("Using connection URL from {}", key);
            return Self {
                source: ConnectionSource::url(url),
                mssql,
            };
        }

        let port = get("DB_PORT").and_then(|raw| match raw.trim().parse::<u16>() {
            Ok(port) if port > 0 => Some(port),
            _ => {
                tracing::warn!("Ignoring invalid DB_PORT value '{}'", raw);
                None
            }
        });

        let params = ConnectionParams {
            db_type: get("DB_TYPE")
                .map(|db_type| db_type.to_lowercase())
                .unwrap_or_else(|| "postgresql".to_string()),
            host: get("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port,
            user: get("DB_USER"),
            password: get("DB_PASSWORD").map(Zeroizing::new),
            database: get("DB_NAME"),
            mssql: mssql.clone(),
        };

        Self {
            source: ConnectionSource::Params(params),
            mssql,
        }
    }

    /// Resolves these settings into a descriptor.
    pub fn resolve(&self) -> ConnectionDescriptor {
        DialectResolver::new(self.mssql.clone()).resolve(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_url_precedence() {
        let settings = ConnectionSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", ""),
            ("MYSQL_URL", "mysql://a@b/c"),
            ("POSTGRES_URL", "postgresql://x@y/z"),
        ]));
        let descriptor = settings.resolve();
        assert_eq!(descriptor.raw_input(), Some("postgresql://x@y/z"));
    }

    #[test]
    fn test_discrete_params_from_lookup() {
        let settings = ConnectionSettings::from_lookup(lookup_from(&[
            ("DB_TYPE", "MySQL"),
            ("DB_HOST", "db"),
            ("DB_PORT", "3307"),
            ("DB_USER", "reader"),
            ("DB_NAME", "shop"),
        ]));
        assert_eq!(
            settings.resolve().normalized(),
            "mysql+aiomysql://reader@db:3307/shop"
        );
    }

    #[test]
    fn test_invalid_port_falls_back_to_default() {
        let settings = ConnectionSettings::from_lookup(lookup_from(&[("DB_PORT", "not-a-port")]));
        assert_eq!(
            settings.resolve().normalized(),
            "postgresql+asyncpg://postgres@localhost:5432/postgres"
        );
    }

    #[test]
    fn test_mssql_options_apply_to_urls() {
        let settings = ConnectionSettings::from_lookup(lookup_from(&[
            ("MSSQL_URL", "mssql://sa@sql01/master"),
            ("DB_DRIVER", "ODBC Driver 17 for SQL Server"),
        ]));
        assert!(
            settings
                .resolve()
                .normalized()
                .contains("driver=ODBC+Driver+17+for+SQL+Server")
        );
    }

    #[test]
    fn test_debug_output_hides_password() {
        let source = ConnectionSource::Params(ConnectionParams::new("postgresql").with_password("topsecret"));
        assert!(!format!("{source:?}").contains("topsecret"));

        let source = ConnectionSource::url("postgresql://u:topsecret@h/db");
        assert!(!format!("{source:?}").contains("topsecret"));
    }
}
