//! Core library for SQLWarden.
//!
//! SQLWarden sits between an AI agent and a relational database. Agent
//! supplied SQL, or SQL synthesized from a natural-language request, is
//! classified as read-only, bounded with a row cap in the target dialect and
//! only then handed to a database driver.
//!
//! # Safety Guarantees
//! - Text containing a forbidden keyword, or not starting with `SELECT`, is
//!   rejected before any driver sees it
//! - Every gated query carries exactly one row bound
//! - Credentials never appear in logs, errors or `Debug` output
//! - Read-only sessions are requested from the database where the dialect
//!   supports it
//!
//! The classifier is lexical. It has no parser and no notion of functions
//! with side effects, so it is a first line of defense and not a sandbox.
//!
//! # Architecture
//! - [`dialect`]: dialect detection, connection normalization and the
//!   per-dialect strategy table
//! - [`safety`] and [`limit`]: the classifier and the row-cap rewriter
//! - [`synth`]: natural-language to SQL strategies
//! - [`executor`]: feature-gated database drivers behind one async trait
//! - [`gate`]: the service wiring all of the above together

pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod gate;
pub mod limit;
pub mod logging;
pub mod models;
pub mod safety;
pub mod security;
pub mod synth;

// Re-export commonly used types
pub use config::{AccessMode, ConnectionParams, ConnectionSettings, ConnectionSource, GateConfig};
pub use dialect::{ConnectionDescriptor, DialectProfile, DialectResolver, detect_dialect};
pub use error::{Result, SqlWardenError};
pub use executor::{QueryExecutor, connect, load_schema_context};
pub use gate::QueryGate;
pub use models::{
    ColumnDescriptor, Dialect, ExecutionOutcome, PreparedQuery, QueryOutcome, ResultRow, RowCap,
    SchemaContext, TableSummary,
};
pub use safety::{SafeQuery, SafetyVerdict, UnsafeReason, classify};
pub use synth::{NlSynthesizer, SynthesisStrategy, TextToSqlModel};
