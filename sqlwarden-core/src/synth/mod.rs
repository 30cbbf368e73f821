//! Natural-language to SQL synthesis.
//!
//! The synthesizer runs a fixed list of strategies, chosen once at
//! construction, and returns the first output that survives cleaning and
//! validation. When every strategy fails it returns
//! `SELECT * FROM <first table>`. Output still has to pass the safety
//! classifier before anything executes it.

mod learned;
mod rules;

pub use learned::{LearnedModelStrategy, TextToSqlModel};
pub use rules::RuleBasedStrategy;

use crate::error::{Result, SqlWardenError};
use crate::models::SchemaContext;

/// Substrings that disqualify synthesized SQL, matched case-insensitively.
pub const DISQUALIFYING_KEYWORDS: [&str; 7] = [
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE",
];

/// One way of turning a request into SQL text.
pub trait SynthesisStrategy: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Produces raw SQL text for `request`.
    ///
    /// # Errors
    /// Strategy-specific; the synthesizer logs the error and moves on.
    fn synthesize(&self, request: &str, schema: &SchemaContext) -> Result<String>;
}

/// Normalizes raw strategy output.
///
/// Collapses whitespace, trims, strips trailing `;` and, when the text does
/// not start with `SELECT` but contains it later, cuts everything before the
/// first `SELECT`. Returns `None` when no `SELECT` is present.
pub fn clean_generated_sql(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches(';').trim_end();
    if trimmed.is_empty() {
        return None;
    }

    let upper = trimmed.to_ascii_uppercase();
    if upper.starts_with("SELECT") {
        return Some(trimmed.to_string());
    }

    upper
        .find("SELECT")
        .and_then(|position| trimmed.get(position..))
        .map(str::to_string)
}

/// Checks cleaned output: starts with `SELECT`, contains `FROM`, and
/// contains none of [`DISQUALIFYING_KEYWORDS`] anywhere.
pub fn is_valid_sql(sql: &str) -> bool {
    let upper = sql.to_ascii_uppercase();
    upper.starts_with("SELECT")
        && upper.contains("FROM")
        && !DISQUALIFYING_KEYWORDS
            .iter()
            .any(|keyword| upper.contains(keyword))
}

/// Ordered set of synthesis strategies.
///
/// # Example
/// ```rust
/// use sqlwarden_core::models::SchemaContext;
/// use sqlwarden_core::synth::NlSynthesizer;
///
/// let schema = SchemaContext::new()
///     .with_table("customers", vec![])
///     .with_table("orders", vec![]);
/// let synthesizer = NlSynthesizer::rule_based();
///
/// assert_eq!(
///     synthesizer.synthesize("show all customers", &schema).unwrap(),
///     "SELECT * FROM customers"
/// );
/// ```
pub struct NlSynthesizer {
    strategies: Vec<Box<dyn SynthesisStrategy>>,
}

impl NlSynthesizer {
    /// Learned model first when given, rule-based strategy last.
    pub fn new(model: Option<Box<dyn TextToSqlModel>>) -> Self {
        let mut strategies: Vec<Box<dyn SynthesisStrategy>> = Vec::with_capacity(2);
        if let Some(model) = model {
            strategies.push(Box::new(LearnedModelStrategy::new(model)));
        }
        strategies.push(Box::new(RuleBasedStrategy));
        Self { strategies }
    }

    /// Only the rule-based strategy.
    pub fn rule_based() -> Self {
        Self::new(None)
    }

    /// An explicit strategy list, tried in order.
    pub fn with_strategies(strategies: Vec<Box<dyn SynthesisStrategy>>) -> Self {
        Self { strategies }
    }

    /// Strategy names in the order they are tried.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Turns `request` into a single SELECT statement.
    ///
    /// # Errors
    /// Returns [`SqlWardenError::NoTablesAvailable`] when `schema` is empty.
    pub fn synthesize(&self, request: &str, schema: &SchemaContext) -> Result<String> {
        if schema.is_empty() {
            return Err(SqlWardenError::NoTablesAvailable);
        }

        for strategy in &self.strategies {
            match strategy.synthesize(request, schema) {
                Ok(raw) => match clean_generated_sql(&raw).filter(|sql| is_valid_sql(sql)) {
                    Some(sql) => {
                        tracing::info!("{} strategy produced SQL: {}", strategy.name(), sql);
                        return Ok(sql);
                    }
                    None => tracing::warn!(
                        "{} strategy produced invalid SQL, trying next strategy",
                        strategy.name()
                    ),
                },
                Err(e) => tracing::warn!("{} strategy failed: {}", strategy.name(), e),
            }
        }

        let fallback = RuleBasedStrategy::default_statement(schema)?;
        tracing::info!("All strategies failed, using default: {}", fallback);
        Ok(fallback)
    }
}

impl Default for NlSynthesizer {
    fn default() -> Self {
        Self::rule_based()
    }
}

impl std::fmt::Debug for NlSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NlSynthesizer")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl TextToSqlModel for Fixed {
        fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    impl TextToSqlModel for Broken {
        fn generate(&self, _prompt: &str) -> Result<String> {
            Err(SqlWardenError::synthesis_failed("test", "model offline"))
        }
    }

    fn schema() -> SchemaContext {
        SchemaContext::new()
            .with_table("customers", vec![])
            .with_table("orders", vec![])
    }

    #[test]
    fn test_clean_generated_sql() {
        assert_eq!(
            clean_generated_sql("  SELECT *\n  FROM t ;;").as_deref(),
            Some("SELECT * FROM t")
        );
        assert_eq!(
            clean_generated_sql("Answer: select id from t").as_deref(),
            Some("select id from t")
        );
        assert_eq!(clean_generated_sql("no sql here"), None);
        assert_eq!(clean_generated_sql("   "), None);
    }

    #[test]
    fn test_is_valid_sql_uses_substrings() {
        assert!(is_valid_sql("SELECT * FROM t"));
        assert!(!is_valid_sql("SELECT 1"));
        assert!(!is_valid_sql("SELECT updated_at FROM t"));
        assert!(!is_valid_sql("WITH x AS (SELECT 1) SELECT * FROM x"));
    }

    #[test]
    fn test_learned_model_output_wins_when_valid() {
        let synthesizer = NlSynthesizer::new(Some(Box::new(Fixed("SQL: SELECT name FROM customers;"))));
        assert_eq!(
            synthesizer.synthesize("names", &schema()).unwrap(),
            "SELECT name FROM customers"
        );
    }

    #[test]
    fn test_invalid_model_output_falls_through() {
        let synthesizer = NlSynthesizer::new(Some(Box::new(Fixed("DELETE FROM customers"))));
        assert_eq!(
            synthesizer.synthesize("count all orders", &schema()).unwrap(),
            "SELECT COUNT(*) as count FROM orders"
        );
    }

    #[test]
    fn test_model_error_falls_through() {
        let synthesizer = NlSynthesizer::new(Some(Box::new(Broken)));
        assert_eq!(
            synthesizer.strategy_names(),
            vec!["learned-model", "rule-based"]
        );
        assert_eq!(
            synthesizer.synthesize("show all customers", &schema()).unwrap(),
            "SELECT * FROM customers"
        );
    }

    #[test]
    fn test_all_strategies_failing_returns_default() {
        let synthesizer = NlSynthesizer::with_strategies(vec![Box::new(LearnedModelStrategy::new(
            Box::new(Broken),
        ))]);
        assert_eq!(
            synthesizer.synthesize("anything", &schema()).unwrap(),
            "SELECT * FROM customers"
        );
    }

    #[test]
    fn test_empty_schema_is_rejected_before_strategies() {
        let result = NlSynthesizer::new(Some(Box::new(Fixed("SELECT 1 FROM t")))).synthesize("x", &SchemaContext::new());
        assert!(matches!(result, Err(SqlWardenError::NoTablesAvailable)));
    }
}
