//! Configuration types for connections and the query gate.
//!
//! - `ConnectionSource` / `ConnectionParams` / `MssqlOptions`: how to reach
//!   the database, loadable from the environment
//! - `GateConfig`: row cap, access mode, timeouts and pool size
//!
//! # Security
//! Passwords are only ever held in zeroizing buffers and are omitted from
//! every `Debug` and `Display` implementation in this module.

mod connection;
mod gate;

pub use connection::{
    ConnectionParams, ConnectionSettings, ConnectionSource, DEFAULT_MSSQL_DRIVER, MssqlOptions,
    URL_ENV_VARS,
};
pub use gate::{AccessMode, GateConfig};
