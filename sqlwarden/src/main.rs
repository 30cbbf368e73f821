//! Read-only SQL gate for AI agents.
//!
//! This binary classifies, bounds and runs SQL on behalf of an agent. Every
//! command prints JSON on stdout; logs go to stderr.
//!
//! # Safety Guarantees
//! - Rejected text never reaches a database driver
//! - Every gated query is bounded by a row cap
//! - Connection strings are redacted in all output

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use sqlwarden_core::{
    config::{AccessMode, ConnectionSettings, ConnectionSource, GateConfig},
    dialect::{ConnectionDescriptor, DialectProfile},
    executor::{QueryExecutor, connect, load_schema_context},
    gate::{DEFAULT_SAMPLE_ROWS, QueryGate},
    logging::{LogFormat, init_logging},
    models::{Dialect, SchemaContext},
    safety::{self, SafetyVerdict},
    synth::NlSynthesizer,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};

/// Exit status for rejected or unsafe text.
const EXIT_REJECTED: u8 = 2;

#[derive(Parser)]
#[command(name = "sqlwarden")]
#[command(about = "Read-only SQL gate for AI agents")]
#[command(version)]
#[command(long_about = "
SQLWarden - read-only SQL gate for AI agents

Agent supplied SQL, or SQL synthesized from a natural-language request, is
classified as read-only and bounded with a row cap before it reaches the
database.

SUPPORTED DATABASES:
- PostgreSQL (postgresql:// or postgres://)
- SQLite (sqlite:///relative.db, sqlite:////absolute.db, sqlite:///:memory:)
- MySQL (mysql://) [if compiled with --features mysql]
- SQL Server (mssql:// or sqlserver://) [if compiled with --features mssql]

Without --database-url the connection comes from DATABASE_URL, DB_URL,
POSTGRES_URL, MYSQL_URL, MSSQL_URL, SQLSERVER_URL, or from DB_TYPE, DB_HOST,
DB_PORT, DB_USER, DB_PASSWORD and DB_NAME.

EXAMPLES:
  sqlwarden check 'SELECT * FROM customers'
  sqlwarden rewrite --dialect mssql --cap 3 'SELECT * FROM customers'
  sqlwarden --database-url sqlite:///shop.db ask 'show top 5 customers'
  sqlwarden --database-url sqlite:///shop.db sample orders --rows 10
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Database connection URL
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        hide_env_values = true,
        help = "Database connection string (credentials are redacted in output)"
    )]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Only log errors")]
    quiet: bool,

    /// Log line format
    #[arg(long, global = true, default_value = "text", help = "Log format: text or json")]
    log_format: LogFormat,

    /// Query timeout in seconds
    #[arg(long, global = true, default_value = "30", help = "Timeout for each database call")]
    timeout: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Classify SQL without running it
    Check {
        /// SQL text to classify
        sql: String,
    },
    /// Classify and bound SQL without running it
    Rewrite {
        /// SQL text to rewrite
        sql: String,
        /// Target dialect (defaults to the connection's dialect)
        #[arg(long)]
        dialect: Option<Dialect>,
        /// Row cap
        #[arg(long)]
        cap: Option<u32>,
    },
    /// Turn a natural-language request into SQL without running it
    Synthesize {
        /// Natural-language request
        request: String,
        /// JSON file with `[{"name": .., "columns": [..]}]`; introspects the
        /// database when omitted
        #[arg(long)]
        schema_file: Option<PathBuf>,
    },
    /// Show the resolved connection
    Resolve,
    /// Test the database connection
    Test,
    /// List tables with column counts
    Tables,
    /// Describe a table's columns
    Describe {
        /// Table name
        table: String,
    },
    /// Dump every table with its columns
    Schema,
    /// Fetch a few rows of a table through the gate
    Sample {
        /// Table name
        table: String,
        /// Number of rows (at most 50)
        #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
        rows: u32,
    },
    /// Run SQL through the gate
    Query {
        /// SQL text to run
        sql: String,
        /// Row cap
        #[arg(long)]
        cap: Option<u32>,
        /// Run rejected text as an unbounded statement
        #[arg(long)]
        allow_writes: bool,
    },
    /// Answer a natural-language request against the database
    Ask {
        /// Natural-language request
        request: String,
        /// Row cap
        #[arg(long)]
        cap: Option<u32>,
    },
    /// List supported dialects
    Dialects,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format)?;

    let config = GateConfig::new().with_query_timeout(Duration::from_secs(cli.global.timeout));
    config.validate()?;

    match &cli.command {
        Command::Check { sql } => {
            let verdict = safety::classify(sql);
            print_json(&json!({ "sql": sql, "verdict": verdict }))?;
            Ok(verdict_status(verdict))
        }
        Command::Rewrite { sql, dialect, cap } => {
            let dialect = dialect.unwrap_or_else(|| resolve_connection(&cli).dialect());
            let gate = QueryGate::new(dialect, config);
            match gate.prepare_sql(sql, *cap) {
                Ok(prepared) => {
                    print_json(&prepared)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) if e.is_rejection() => reject(&e),
                Err(e) => Err(e.into()),
            }
        }
        Command::Synthesize {
            request,
            schema_file,
        } => {
            let schema = match schema_file {
                Some(path) => load_schema_file(path)?,
                None => {
                    let executor = open_executor(&cli, &config).await?;
                    let schema = load_schema_context(executor.as_ref()).await;
                    executor.close().await;
                    schema.context("Failed to introspect database schema")?
                }
            };
            match NlSynthesizer::rule_based().synthesize(request, &schema) {
                Ok(sql) => {
                    let verdict = safety::classify(&sql);
                    print_json(&json!({ "request": request, "sql": sql, "verdict": verdict }))?;
                    Ok(verdict_status(verdict))
                }
                Err(e) if e.is_rejection() => reject(&e),
                Err(e) => Err(e.into()),
            }
        }
        Command::Resolve => {
            let descriptor = resolve_connection(&cli);
            print_json(&json!({
                "dialect": descriptor.dialect(),
                "normalized": descriptor.redacted(),
                "from_url": descriptor.raw_input().is_some(),
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Test => {
            let executor = open_executor(&cli, &config).await?;
            let result = executor.test_connection().await;
            executor.close().await;
            result.context("Connection test failed")?;
            print_json(&json!({ "status": "ok", "dialect": executor.dialect() }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Tables => {
            let executor = open_executor(&cli, &config).await?;
            let tables = executor.list_tables().await;
            executor.close().await;
            print_json(&tables.context("Failed to list tables")?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Describe { table } => {
            let executor = open_executor(&cli, &config).await?;
            let columns = executor.describe_table(table).await;
            executor.close().await;
            print_json(&columns.with_context(|| format!("Failed to describe table {table}"))?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Schema => {
            let executor = open_executor(&cli, &config).await?;
            let schema = load_schema_context(executor.as_ref()).await;
            executor.close().await;
            print_json(&schema.context("Failed to introspect database schema")?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Sample { table, rows } => {
            let executor = open_executor(&cli, &config).await?;
            let gate = QueryGate::new(executor.dialect(), config);

            let outcome = gate.sample_table(executor.as_ref(), table, Some(*rows)).await;
            executor.close().await;
            match outcome {
                Ok(outcome) => {
                    print_json(&outcome)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) if e.is_rejection() => reject(&e),
                Err(e) => Err(e).with_context(|| format!("Failed to sample table {table}")),
            }
        }
        Command::Query {
            sql,
            cap,
            allow_writes,
        } => {
            let access_mode = if *allow_writes {
                AccessMode::Unrestricted
            } else {
                AccessMode::ReadOnly
            };
            let config = config.with_access_mode(access_mode);
            let executor = open_executor(&cli, &config).await?;
            let gate = QueryGate::new(executor.dialect(), config);

            let outcome = gate.run_statement(executor.as_ref(), sql, *cap).await;
            executor.close().await;
            match outcome {
                Ok(outcome) => {
                    print_json(&outcome)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) if e.is_rejection() => reject(&e),
                Err(e) => Err(e).context("Query failed"),
            }
        }
        Command::Ask { request, cap } => {
            let executor = open_executor(&cli, &config).await?;
            let gate = QueryGate::new(executor.dialect(), config);

            let outcome = gate.run_nl(executor.as_ref(), request, *cap).await;
            executor.close().await;
            match outcome {
                Ok(outcome) => {
                    print_json(&outcome)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) if e.is_rejection() => reject(&e),
                Err(e) => Err(e).context("Request failed"),
            }
        }
        Command::Dialects => {
            let dialects: Vec<_> = DialectProfile::all()
                .iter()
                .map(|profile| {
                    let row_bound = if profile.uses_top() { "TOP" } else { "LIMIT" };
                    json!({
                        "dialect": profile.dialect,
                        "scheme": profile.async_scheme,
                        "default_port": profile.default_port,
                        "row_bound": row_bound,
                    })
                })
                .collect();
            print_json(&dialects)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Resolves the connection from `--database-url` or the environment.
fn resolve_connection(cli: &Cli) -> ConnectionDescriptor {
    let mut settings = ConnectionSettings::from_env();
    if let Some(url) = cli.database_url.as_deref().filter(|url| !url.trim().is_empty()) {
        settings.source = ConnectionSource::url(url);
    }
    settings.resolve()
}

async fn open_executor(cli: &Cli, config: &GateConfig) -> Result<Box<dyn QueryExecutor>> {
    let descriptor = resolve_connection(cli);
    info!("Using {}", descriptor);
    connect(&descriptor, config)
        .await
        .with_context(|| format!("Failed to connect to {}", descriptor.redacted()))
}

fn load_schema_file(path: &Path) -> Result<SchemaContext> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file {}", path.display()))?;
    let schema: SchemaContext = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid schema file {}", path.display()))?;
    debug!("Loaded {} tables from {}", schema.len(), path.display());
    Ok(schema)
}

fn verdict_status(verdict: SafetyVerdict) -> ExitCode {
    if verdict.is_safe() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_REJECTED)
    }
}

fn reject(error: &sqlwarden_core::SqlWardenError) -> Result<ExitCode> {
    print_json(&json!({ "rejected": true, "error": error.to_string() }))?;
    Ok(ExitCode::from(EXIT_REJECTED))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_rewrite_flags() {
        let cli = Cli::try_parse_from([
            "sqlwarden",
            "-vv",
            "rewrite",
            "--dialect",
            "sqlserver",
            "--cap",
            "3",
            "SELECT * FROM customers",
        ])
        .unwrap();

        assert_eq!(cli.global.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Rewrite {
                dialect: Some(Dialect::Mssql),
                cap: Some(3),
                ..
            }
        ));
    }

    #[test]
    fn test_cli_parses_sample_and_schema() {
        let cli = Cli::try_parse_from(["sqlwarden", "sample", "orders"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Sample { ref table, rows: DEFAULT_SAMPLE_ROWS } if table == "orders"
        ));

        let cli = Cli::try_parse_from(["sqlwarden", "sample", "orders", "--rows", "20"]).unwrap();
        assert!(matches!(cli.command, Command::Sample { rows: 20, .. }));

        let cli = Cli::try_parse_from(["sqlwarden", "schema"]).unwrap();
        assert!(matches!(cli.command, Command::Schema));
    }

    #[test]
    fn test_cli_rejects_unknown_log_format() {
        let result = Cli::try_parse_from(["sqlwarden", "--log-format", "xml", "dialects"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verdict_exit_status() {
        assert_eq!(verdict_status(safety::classify("SELECT 1")), ExitCode::SUCCESS);
        assert_eq!(
            verdict_status(safety::classify("DROP TABLE t")),
            ExitCode::from(EXIT_REJECTED)
        );
    }
}
