//! Read-only safety classification for agent-supplied SQL.
//!
//! The classifier is a lexical allowlist, not a parser. It strips comments,
//! rejects any statement mentioning a data-changing or privilege keyword as
//! a whole word, and requires what remains to start with `SELECT` (after at
//! most one leading `WITH … )` header).
//!
//! # Soundness
//! A keyword split by an inline comment (`DR/**/OP`) or hidden behind
//! dialect-specific quoting is not detected, and keywords inside quoted
//! literals are rejected even though they are harmless. The classifier
//! guards against accidental or naive destructive intent from an agent; it
//! is not a security boundary against a determined author with query
//! privileges. Callers rely on this exact leniency, so a stricter tokenizer
//! belongs in a separate classifier rather than in this one.

use crate::error::{Result, SqlWardenError};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Keywords that make a statement unsafe, in reporting priority order.
pub const FORBIDDEN_KEYWORDS: [&str; 14] = [
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE", "REPLACE", "MERGE",
    "EXEC", "EXECUTE", "CALL", "GRANT", "REVOKE",
];

/// Why a statement was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "keyword", rename_all = "snake_case")]
pub enum UnsafeReason {
    /// A forbidden keyword appears as a whole word
    ForbiddenKeyword(&'static str),
    /// The statement does not begin with SELECT (or a CTE followed by SELECT)
    NotSelect,
}

impl std::fmt::Display for UnsafeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForbiddenKeyword(keyword) => write!(f, "contains forbidden keyword: {keyword}"),
            Self::NotSelect => f.write_str("must be a SELECT statement"),
        }
    }
}

/// Classification outcome for a piece of SQL text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "UPPERCASE")]
pub enum SafetyVerdict {
    Safe,
    Unsafe { reason: UnsafeReason },
}

impl SafetyVerdict {
    pub const fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }

    /// The rejection reason, if any.
    pub const fn reason(&self) -> Option<UnsafeReason> {
        match self {
            Self::Safe => None,
            Self::Unsafe { reason } => Some(*reason),
        }
    }
}

impl std::fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => f.write_str("SAFE"),
            Self::Unsafe { reason } => write!(f, "UNSAFE: {reason}"),
        }
    }
}

/// SQL text that the classifier accepted.
///
/// The only way to obtain one is [`check`], so holding a `SafeQuery` proves
/// the text passed the gate. The original casing and layout are preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeQuery(String);

impl SafeQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for SafeQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SafeQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pre-compiled classifier patterns.
struct ClassifierPatterns {
    line_comment: Regex,
    block_comment: Regex,
    select_head: Regex,
    keywords: Vec<(&'static str, Regex)>,
}

impl ClassifierPatterns {
    fn instance() -> &'static Self {
        static PATTERNS: OnceLock<ClassifierPatterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::compile)
    }

    #[allow(clippy::expect_used)]
    fn compile() -> Self {
        let keywords = FORBIDDEN_KEYWORDS
            .iter()
            .map(|&keyword| {
                let pattern = Regex::new(&format!(r"\b{keyword}\b"))
                    .expect("Invalid forbidden keyword pattern");
                (keyword, pattern)
            })
            .collect();

        Self {
            line_comment: Regex::new(r"(?m)--.*$").expect("Invalid line comment pattern"),
            block_comment: Regex::new(r"(?s)/\*.*?\*/").expect("Invalid block comment pattern"),
            select_head: Regex::new(r"^\s*(WITH\s+.*?\)\s*)?SELECT\b")
                .expect("Invalid select head pattern"),
            keywords,
        }
    }
}

/// Strips comments and collapses whitespace, returning the upper-cased
/// matching copy.
fn normalize_for_matching(sql: &str) -> String {
    let patterns = ClassifierPatterns::instance();
    let without_line = patterns.line_comment.replace_all(sql, "");
    let without_block = patterns.block_comment.replace_all(&without_line, "");
    without_block
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Classifies SQL text as SAFE or UNSAFE. Never fails.
///
/// # Example
/// ```rust
/// use sqlwarden_core::safety::{classify, SafetyVerdict, UnsafeReason};
///
/// assert_eq!(classify("select id, updated_at from delete_log"), SafetyVerdict::Safe);
/// assert_eq!(
///     classify("DROP TABLE customers").reason(),
///     Some(UnsafeReason::ForbiddenKeyword("DROP"))
/// );
/// ```
pub fn classify(sql: &str) -> SafetyVerdict {
    let patterns = ClassifierPatterns::instance();
    let cleaned = normalize_for_matching(sql);

    if let Some((keyword, _)) = patterns
        .keywords
        .iter()
        .find(|(_, pattern)| pattern.is_match(&cleaned))
    {
        tracing::debug!("Rejected query: forbidden keyword {}", keyword);
        return SafetyVerdict::Unsafe {
            reason: UnsafeReason::ForbiddenKeyword(keyword),
        };
    }

    if !patterns.select_head.is_match(&cleaned) {
        tracing::debug!("Rejected query: not a SELECT statement");
        return SafetyVerdict::Unsafe {
            reason: UnsafeReason::NotSelect,
        };
    }

    SafetyVerdict::Safe
}

/// Classifies `sql` and wraps it as a [`SafeQuery`] when accepted.
///
/// # Errors
/// Returns [`SqlWardenError::UnsafeQuery`] carrying the classifier reason.
pub fn check(sql: &str) -> Result<SafeQuery> {
    match classify(sql) {
        SafetyVerdict::Safe => Ok(SafeQuery(sql.to_string())),
        SafetyVerdict::Unsafe { reason } => Err(SqlWardenError::unsafe_query(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_singleton() {
        let p1 = ClassifierPatterns::instance();
        let p2 = ClassifierPatterns::instance();
        assert!(std::ptr::eq(p1, p2));
        assert_eq!(p1.keywords.len(), FORBIDDEN_KEYWORDS.len());
    }

    #[test]
    fn test_normalize_strips_comments_and_whitespace() {
        let sql = "select a, -- trailing\n  b /* multi\nline */ from\tt";
        assert_eq!(normalize_for_matching(sql), "SELECT A, B FROM T");
    }

    #[test]
    fn test_keyword_priority_follows_list_order() {
        // DELETE appears first in the text, DROP first in the keyword list
        let verdict = classify("DELETE FROM t; DROP TABLE t");
        assert_eq!(verdict.reason(), Some(UnsafeReason::ForbiddenKeyword("DROP")));
    }

    #[test]
    fn test_cte_header_is_skipped() {
        assert!(classify("WITH recent AS (SELECT * FROM orders) SELECT * FROM recent").is_safe());
        assert!(!classify("WITH recent AS (SELECT 1)").is_safe());
    }

    #[test]
    fn test_empty_and_comment_only_text() {
        assert_eq!(classify("").reason(), Some(UnsafeReason::NotSelect));
        assert_eq!(
            classify("-- SELECT * FROM t").reason(),
            Some(UnsafeReason::NotSelect)
        );
    }

    #[test]
    fn test_reason_display_strings() {
        assert_eq!(
            UnsafeReason::ForbiddenKeyword("GRANT").to_string(),
            "contains forbidden keyword: GRANT"
        );
        assert_eq!(UnsafeReason::NotSelect.to_string(), "must be a SELECT statement");
        assert_eq!(SafetyVerdict::Safe.to_string(), "SAFE");
    }

    #[test]
    fn test_check_preserves_original_text() {
        let query = check("  select Name from Customers  ").unwrap();
        assert_eq!(query.as_str(), "  select Name from Customers  ");
    }

    #[test]
    fn test_verdict_serialization() {
        let json = serde_json::to_value(classify("UPDATE t SET a = 1")).unwrap();
        assert_eq!(json["verdict"], "UNSAFE");
        assert_eq!(json["reason"]["kind"], "forbidden_keyword");
        assert_eq!(json["reason"]["keyword"], "UPDATE");
    }
}
