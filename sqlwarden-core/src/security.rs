//! Credential handling for drivers that take credentials separately from
//! the connection URL.
//!
//! # Security
//! - Credentials are moved into `Zeroizing` containers as soon as they are
//!   extracted
//! - Passwords never appear in `Debug` output

use crate::error::{Result, SqlWardenError};
use zeroize::{Zeroize, Zeroizing};

/// Secure credential container that automatically zeros memory on drop.
///
/// # Example
/// ```rust
/// use sqlwarden_core::security::Credentials;
///
/// let creds = Credentials::new("reporter".to_string(), Some("s3cret".to_string()));
/// assert_eq!(creds.username(), "reporter");
/// assert!(creds.has_password());
/// assert!(!format!("{creds:?}").contains("s3cret"));
/// ```
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<Option<String>>,
}

impl Credentials {
    pub fn new(username: String, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Exposes the password to a driver. Do not log the result.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username.as_str())
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Host, port, database and query options of a connection URL, with the
/// credentials split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub options: Vec<(String, String)>,
}

impl ServerAddress {
    /// Case-insensitive lookup of a query option.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }
}

/// Splits a connection URL into its address and its credentials.
///
/// Percent-encoded user names and passwords are decoded.
///
/// # Errors
/// Returns a configuration error if the URL cannot be parsed or has no host.
/// The URL itself never appears in the error.
pub fn parse_connection_url(connection_url: &str) -> Result<(ServerAddress, Credentials)> {
    let url = url::Url::parse(connection_url).map_err(|e| {
        SqlWardenError::configuration(format!("Invalid connection string format: {e}"))
    })?;

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| SqlWardenError::configuration("Missing host in connection string"))?
        .to_string();

    let database = url
        .path()
        .strip_prefix('/')
        .filter(|path| !path.is_empty())
        .map(percent_decode);

    let credentials = Credentials::new(
        percent_decode(url.username()),
        url.password().map(percent_decode),
    );

    let address = ServerAddress {
        host,
        port: url.port(),
        database,
        options: url.query_pairs().into_owned().collect(),
    };

    Ok((address, credentials))
}

/// Decodes `%XX` escapes; malformed escapes are kept verbatim.
fn percent_decode(input: &str) -> String {
    percent_encoding::percent_decode_str(input)
        .decode_utf8_lossy()
        .into_owned()
}
