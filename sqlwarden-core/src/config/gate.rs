//! Query gate configuration.

use crate::error::{Result, SqlWardenError};
use crate::models::RowCap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether non-SELECT statements may run at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Only classified-SAFE text runs, always bounded
    #[default]
    ReadOnly,
    /// Text the classifier rejects runs unbounded as a statement
    Unrestricted,
}

/// Settings for the query gate and the executors it drives.
///
/// # Example
/// ```rust
/// use sqlwarden_core::config::{AccessMode, GateConfig};
/// use std::time::Duration;
///
/// let config = GateConfig::new()
///     .with_row_cap(100)
///     .unwrap()
///     .with_query_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.access_mode, AccessMode::ReadOnly);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    pub default_row_cap: RowCap,
    pub access_mode: AccessMode,
    /// Pool acquire / TCP connect timeout
    pub connect_timeout: Duration,
    /// Bound on every executor call
    pub query_timeout: Duration,
    pub max_connections: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            default_row_cap: RowCap::DEFAULT,
            access_mode: AccessMode::ReadOnly,
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
            max_connections: 5,
        }
    }
}

impl GateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns a configuration error for zero timeouts or a pool size outside
    /// `1..=100`.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(SqlWardenError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(SqlWardenError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        if self.max_connections == 0 {
            return Err(SqlWardenError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > 100 {
            return Err(SqlWardenError::configuration(
                "max_connections should not exceed 100",
            ));
        }

        Ok(())
    }

    /// Sets the default row cap.
    ///
    /// # Errors
    /// Returns a configuration error when `rows` is zero.
    pub fn with_row_cap(mut self, rows: u32) -> Result<Self> {
        self.default_row_cap = RowCap::new(rows)?;
        Ok(self)
    }

    pub const fn with_access_mode(mut self, access_mode: AccessMode) -> Self {
        self.access_mode = access_mode;
        self
    }

    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub const fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub const fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Resolves an optional per-request cap against the default.
    ///
    /// # Errors
    /// Returns a configuration error when `requested` is `Some(0)`.
    pub fn row_cap(&self, requested: Option<u32>) -> Result<RowCap> {
        requested.map_or(Ok(self.default_row_cap), RowCap::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_config_default() {
        let config = GateConfig::default();
        assert_eq!(config.default_row_cap.get(), 50);
        assert_eq!(config.access_mode, AccessMode::ReadOnly);
        assert_eq!(config.max_connections, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gate_config_validation() {
        let config = GateConfig::new().with_query_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = GateConfig::new().with_connect_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = GateConfig::new().with_max_connections(0);
        assert!(config.validate().is_err());

        let config = GateConfig::new().with_max_connections(101);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_row_cap_resolution() {
        let config = GateConfig::new();
        assert_eq!(config.row_cap(None).unwrap().get(), 50);
        assert_eq!(config.row_cap(Some(5)).unwrap().get(), 5);
        assert!(config.row_cap(Some(0)).is_err());
        assert!(GateConfig::new().with_row_cap(0).is_err());
    }
}
