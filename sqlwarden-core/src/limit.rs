//! Cross-dialect row bounding.
//!
//! The rewriter gives every accepted query exactly one outer row-bounding
//! construct: `LIMIT <n>` for postgresql, mysql and sqlite, `TOP <n>` (or an
//! existing `FETCH … ROWS ONLY`) for mssql. An existing bound is rewritten
//! in place; an absent one is appended or wrapped around the query.
//!
//! Detection is lexical. Only constructs at parenthesis depth zero and
//! outside quoted literals and comments count, so a `LIMIT` in a subquery,
//! a string or a comment never masks a missing outer bound. Backslash
//! escapes inside literals are honoured for mysql only.
//!
//! Rewriting never changes the safety verdict: line comments are the only
//! text removed, and appended or wrapping text carries no comment markers
//! or forbidden keywords.

use crate::dialect::DialectProfile;
use crate::models::{Dialect, PreparedQuery, RowCap};
use crate::safety::SafeQuery;
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// What the detector found in a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitClause {
    /// No outer bounding keyword
    Absent,
    /// A bounding keyword is present but carries no numeric literal
    /// (`LIMIT ALL`, `TOP (@n)`, `TOP 10 PERCENT`, `FETCH NEXT @n ROWS ONLY`)
    Unresolvable,
    /// Byte ranges of the numeric literals to replace with the cap
    Present(Vec<Range<usize>>),
}

struct LimitPatterns {
    limit_keyword: Regex,
    limit_value: Regex,
    top_keyword: Regex,
    top_value: Regex,
    fetch_keyword: Regex,
    fetch_value: Regex,
}

impl LimitPatterns {
    fn instance() -> &'static Self {
        static PATTERNS: OnceLock<LimitPatterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::compile)
    }

    #[allow(clippy::expect_used)]
    fn compile() -> Self {
        Self {
            limit_keyword: Regex::new(r"(?i)\bLIMIT\b").expect("Invalid LIMIT pattern"),
            limit_value: Regex::new(r"(?i)^LIMIT\s+(\d+)\b(?:\s*,\s*(\d+)\b)?")
                .expect("Invalid LIMIT value pattern"),
            top_keyword: Regex::new(r"(?i)^SELECT\s+(?:(?:ALL|DISTINCT)\s+)?TOP\b")
                .expect("Invalid TOP pattern"),
            top_value: Regex::new(
                r"(?i)^SELECT\s+(?:(?:ALL|DISTINCT)\s+)?TOP\s*(?:\(\s*(\d+)\s*\)|(\d+)\b)(\s+PERCENT\b)?",
            )
            .expect("Invalid TOP value pattern"),
            fetch_keyword: Regex::new(r"(?i)\bFETCH\s+(?:NEXT|FIRST)\b")
                .expect("Invalid FETCH pattern"),
            fetch_value: Regex::new(r"(?i)^FETCH\s+(?:NEXT|FIRST)\s+(\d+)\s+ROWS?\s+ONLY\b")
                .expect("Invalid FETCH value pattern"),
        }
    }
}

/// Lexical class of one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Code,
    Literal,
    LineComment,
    BlockComment,
}

#[derive(Clone, Copy)]
enum ScanState {
    Code,
    Quoted { close: char, escaped: bool },
    LineComment,
    BlockComment { previous: char },
}

struct Scanned {
    index: usize,
    ch: char,
    lexeme: Lexeme,
    depth: usize,
}

/// Classifies every character of `sql` and records the parenthesis depth
/// it sits at. With `backslash_escapes` a `\` inside a quoted literal
/// escapes the next character (mysql).
fn scan(sql: &str, backslash_escapes: bool) -> Vec<Scanned> {
    let mut scanned = Vec::with_capacity(sql.len());
    let mut state = ScanState::Code;
    let mut depth: usize = 0;
    let mut chars = sql.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        let at_depth = depth;
        let lexeme = match state {
            ScanState::Code => match c {
                '-' if chars.peek().is_some_and(|&(_, next)| next == '-') => {
                    state = ScanState::LineComment;
                    Lexeme::LineComment
                }
                '/' if chars.peek().is_some_and(|&(_, next)| next == '*') => {
                    scanned.push(Scanned {
                        index,
                        ch: c,
                        lexeme: Lexeme::BlockComment,
                        depth: at_depth,
                    });
                    if let Some((star_index, star)) = chars.next() {
                        scanned.push(Scanned {
                            index: star_index,
                            ch: star,
                            lexeme: Lexeme::BlockComment,
                            depth: at_depth,
                        });
                    }
                    state = ScanState::BlockComment { previous: '\0' };
                    continue;
                }
                '\'' | '"' | '`' => {
                    state = ScanState::Quoted {
                        close: c,
                        escaped: false,
                    };
                    Lexeme::Literal
                }
                '[' => {
                    state = ScanState::Quoted {
                        close: ']',
                        escaped: false,
                    };
                    Lexeme::Literal
                }
                '(' => {
                    depth = depth.saturating_add(1);
                    Lexeme::Code
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    Lexeme::Code
                }
                _ => Lexeme::Code,
            },
            ScanState::Quoted { close, escaped } => {
                state = if escaped {
                    ScanState::Quoted {
                        close,
                        escaped: false,
                    }
                } else if backslash_escapes && c == '\\' && matches!(close, '\'' | '"') {
                    ScanState::Quoted {
                        close,
                        escaped: true,
                    }
                } else if c == close {
                    ScanState::Code
                } else {
                    state
                };
                Lexeme::Literal
            }
            ScanState::LineComment if c == '\n' => {
                state = ScanState::Code;
                Lexeme::Code
            }
            ScanState::LineComment => Lexeme::LineComment,
            ScanState::BlockComment { previous } => {
                state = if previous == '*' && c == '/' {
                    ScanState::Code
                } else {
                    ScanState::BlockComment { previous: c }
                };
                Lexeme::BlockComment
            }
        };

        scanned.push(Scanned {
            index,
            ch: c,
            lexeme,
            depth: at_depth,
        });
    }

    scanned
}

/// Removes `--` line comments that sit outside quoted literals and block
/// comments. The terminating newline is kept; block comments are left in
/// place.
pub fn strip_line_comments(sql: &str, dialect: Dialect) -> String {
    scan(sql, dialect.profile().backslash_escapes)
        .into_iter()
        .filter(|scanned| scanned.lexeme != Lexeme::LineComment)
        .map(|scanned| scanned.ch)
        .collect()
}

/// Strips line comments, surrounding whitespace and trailing `;`
/// terminators.
///
/// Block comments are kept verbatim, so the prepared text classifies
/// exactly as the input does.
pub fn prepare_statement(sql: &str, dialect: Dialect) -> String {
    let stripped = strip_line_comments(sql, dialect);
    let mut text = stripped.trim();
    while let Some(rest) = text.strip_suffix(';') {
        text = rest.trim_end();
    }
    text.to_string()
}

/// Marks each byte that sits at parenthesis depth zero outside any quoted
/// literal or comment.
fn top_level_mask(sql: &str, backslash_escapes: bool) -> Vec<bool> {
    let mut mask = vec![false; sql.len()];

    for scanned in scan(sql, backslash_escapes) {
        if scanned.lexeme == Lexeme::Code && scanned.depth == 0 {
            let end = scanned
                .index
                .saturating_add(scanned.ch.len_utf8())
                .min(mask.len());
            if let Some(slots) = mask.get_mut(scanned.index..end) {
                slots.fill(true);
            }
        }
    }

    mask
}

fn is_top_level(mask: &[bool], index: usize) -> bool {
    mask.get(index).copied().unwrap_or(false)
}

fn offset(range: Range<usize>, by: usize) -> Range<usize> {
    range.start.saturating_add(by)..range.end.saturating_add(by)
}

/// Finds the last top-level `LIMIT` and the literal holding its row count.
pub(crate) fn detect_limit(sql: &str, backslash_escapes: bool) -> LimitClause {
    let patterns = LimitPatterns::instance();
    let mask = top_level_mask(sql, backslash_escapes);

    let Some(start) = patterns
        .limit_keyword
        .find_iter(sql)
        .map(|m| m.start())
        .filter(|&start| is_top_level(&mask, start))
        .last()
    else {
        return LimitClause::Absent;
    };

    let tail = sql.get(start..).unwrap_or_default();
    match patterns.limit_value.captures(tail) {
        Some(caps) => caps
            .get(2)
            .or_else(|| caps.get(1))
            .map_or(LimitClause::Unresolvable, |count| {
                LimitClause::Present(vec![offset(count.range(), start)])
            }),
        None => LimitClause::Unresolvable,
    }
}

/// Finds a head `TOP` or a top-level `FETCH NEXT|FIRST … ROWS ONLY`.
pub(crate) fn detect_top(sql: &str, backslash_escapes: bool) -> LimitClause {
    let patterns = LimitPatterns::instance();

    if patterns.top_keyword.is_match(sql) {
        return match patterns.top_value.captures(sql) {
            Some(caps) if caps.get(3).is_none() => caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or(LimitClause::Unresolvable, |count| {
                    LimitClause::Present(vec![count.range()])
                }),
            _ => LimitClause::Unresolvable,
        };
    }

    let mask = top_level_mask(sql, backslash_escapes);
    let Some(start) = patterns
        .fetch_keyword
        .find_iter(sql)
        .map(|m| m.start())
        .filter(|&start| is_top_level(&mask, start))
        .last()
    else {
        return LimitClause::Absent;
    };

    let tail = sql.get(start..).unwrap_or_default();
    patterns
        .fetch_value
        .captures(tail)
        .and_then(|caps| caps.get(1))
        .map_or(LimitClause::Unresolvable, |count| {
            LimitClause::Present(vec![offset(count.range(), start)])
        })
}

fn replace_literals(sql: &str, ranges: &[Range<usize>], cap: RowCap) -> String {
    let replacement = cap.to_string();
    let mut sorted: Vec<&Range<usize>> = ranges.iter().collect();
    sorted.sort_by_key(|range| std::cmp::Reverse(range.start));

    let mut out = sql.to_string();
    for range in sorted {
        if out.get(range.clone()).is_some() {
            out.replace_range(range.clone(), &replacement);
        }
    }
    out
}

/// Bounds a statement with `LIMIT`.
pub(crate) fn apply_limit_clause(sql: &str, clause: &LimitClause, cap: RowCap) -> String {
    match clause {
        LimitClause::Present(ranges) => replace_literals(sql, ranges, cap),
        LimitClause::Absent => format!("{sql} LIMIT {cap}"),
        LimitClause::Unresolvable => format!("SELECT * FROM ({sql}) AS _sub LIMIT {cap}"),
    }
}

/// Bounds a statement with `TOP`.
pub(crate) fn apply_top_clause(sql: &str, clause: &LimitClause, cap: RowCap) -> String {
    match clause {
        LimitClause::Present(ranges) => replace_literals(sql, ranges, cap),
        LimitClause::Absent | LimitClause::Unresolvable => {
            format!("SELECT TOP {cap} * FROM ({sql}) AS _sub")
        }
    }
}

/// Rewrites `sql` so that executing it returns at most `cap` rows.
///
/// The input is expected to have passed the safety classifier; use
/// [`rewrite`] to get that guarantee from the type system.
///
/// # Example
/// ```rust
/// use sqlwarden_core::limit::apply_limit;
/// use sqlwarden_core::models::{Dialect, RowCap};
///
/// let cap = RowCap::new(3).unwrap();
/// assert_eq!(
///     apply_limit("SELECT * FROM customers", Dialect::Mssql, cap),
///     "SELECT TOP 3 * FROM (SELECT * FROM customers) AS _sub"
/// );
/// assert_eq!(
///     apply_limit("select * from t limit 500;", Dialect::Postgresql, cap),
///     "select * from t limit 3"
/// );
/// ```
pub fn apply_limit(sql: &str, dialect: Dialect, cap: RowCap) -> String {
    let profile = DialectProfile::for_dialect(dialect);
    let prepared = prepare_statement(sql, dialect);
    let clause = (profile.detect_limit)(&prepared, profile.backslash_escapes);

    match &clause {
        LimitClause::Present(_) => {
            tracing::debug!("Replacing existing {} row bound with {}", dialect, cap);
        }
        LimitClause::Absent => tracing::debug!("Adding {} row bound of {}", dialect, cap),
        LimitClause::Unresolvable => tracing::debug!(
            "Existing {} row bound has no numeric literal; bounding outer query to {}",
            dialect,
            cap
        ),
    }

    (profile.apply_limit)(&prepared, &clause, cap)
}

/// Rewrites a classified query for `dialect`.
pub fn rewrite(query: &SafeQuery, dialect: Dialect, cap: RowCap) -> PreparedQuery {
    PreparedQuery {
        original: query.as_str().to_string(),
        rewritten: apply_limit(query.as_str(), dialect, cap),
        dialect,
        row_cap: cap,
    }
}
