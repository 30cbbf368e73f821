//! Pattern-driven synthesis used when no learned model is available.

use super::SynthesisStrategy;
use crate::error::{Result, SqlWardenError};
use crate::models::SchemaContext;
use regex::Regex;
use std::sync::OnceLock;

const COUNT_WORD: &str = "count";
const LIMIT_WORDS: [&str; 3] = ["top", "first", "limit"];
const LISTING_WORDS: [&str; 4] = ["all", "everything", "list", "show"];
const DEFAULT_LIMIT: &str = "10";

/// Entity hints: a word in the request, then the table names tried for it.
const TABLE_HINTS: [(&str, [&str; 2]); 2] = [
    ("customer", ["customers", "customer"]),
    ("order", ["orders", "order"]),
];

#[allow(clippy::expect_used)]
fn integer_literal() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]+").expect("Invalid integer pattern"))
}

/// Lexical rules over the lower-cased request.
///
/// First match wins:
/// 1. `count` → `SELECT COUNT(*) as count FROM <table>`
/// 2. `top` / `first` / `limit` → `SELECT * FROM <table> LIMIT <n>`, where
///    `n` is the first integer in the request (default 10)
/// 3. `all` / `everything` / `list` / `show` → `SELECT * FROM <table>`
/// 4. otherwise `SELECT * FROM <first table>`
///
/// The table is chosen from entity hints (`customer`, `order`) and falls
/// back to the first table in discovery order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedStrategy;

impl RuleBasedStrategy {
    pub const NAME: &'static str = "rule-based";

    /// The statement returned when nothing else applies.
    ///
    /// # Errors
    /// Returns [`SqlWardenError::NoTablesAvailable`] for an empty schema.
    pub fn default_statement(schema: &SchemaContext) -> Result<String> {
        schema
            .first_table()
            .map(|table| format!("SELECT * FROM {table}"))
            .ok_or(SqlWardenError::NoTablesAvailable)
    }

    fn choose_table<'a>(lowered: &str, schema: &'a SchemaContext, default: &'a str) -> &'a str {
        let Some((_, candidates)) = TABLE_HINTS
            .iter()
            .find(|(hint, _)| lowered.contains(hint))
        else {
            return default;
        };

        candidates
            .iter()
            .find_map(|candidate| {
                schema
                    .table_names()
                    .find(|name| name.eq_ignore_ascii_case(candidate))
            })
            .unwrap_or(default)
    }
}

impl SynthesisStrategy for RuleBasedStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn synthesize(&self, request: &str, schema: &SchemaContext) -> Result<String> {
        let default = schema
            .first_table()
            .ok_or(SqlWardenError::NoTablesAvailable)?;
        let lowered = request.to_lowercase();
        let table = Self::choose_table(&lowered, schema, default);

        if lowered.contains(COUNT_WORD) {
            return Ok(format!("SELECT COUNT(*) as count FROM {table}"));
        }

        if LIMIT_WORDS.iter().any(|word| lowered.contains(word)) {
            let limit = integer_literal()
                .find(request)
                .map_or(DEFAULT_LIMIT, |m| m.as_str());
            return Ok(format!("SELECT * FROM {table} LIMIT {limit}"));
        }

        if LISTING_WORDS.iter().any(|word| lowered.contains(word)) {
            return Ok(format!("SELECT * FROM {table}"));
        }

        Ok(format!("SELECT * FROM {default}"))
    }
}
