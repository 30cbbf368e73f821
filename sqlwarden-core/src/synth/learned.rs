//! Adapter for externally supplied text-to-SQL models.

use super::SynthesisStrategy;
use crate::error::Result;
use crate::models::{ColumnDescriptor, SchemaContext};

/// A learned text-to-SQL model.
///
/// Implementations receive a fully formatted prompt and return raw model
/// output. The output is cleaned and validated by the synthesizer before it
/// is used, so implementations need not post-process it.
pub trait TextToSqlModel: Send + Sync {
    /// Generates raw SQL text for `prompt`.
    ///
    /// # Errors
    /// Any error is logged by the synthesizer and the next strategy is tried.
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Synthesis strategy backed by a [`TextToSqlModel`].
pub struct LearnedModelStrategy {
    model: Box<dyn TextToSqlModel>,
}

impl LearnedModelStrategy {
    pub const NAME: &'static str = "learned-model";

    pub fn new(model: Box<dyn TextToSqlModel>) -> Self {
        Self { model }
    }

    /// Renders the schema as `Table t: col type[ NOT NULL], … | …`.
    pub fn table_context(schema: &SchemaContext) -> String {
        schema
            .tables()
            .map(|table| {
                let columns: Vec<String> = table.columns.iter().map(describe_column).collect();
                format!("Table {}: {}", table.name, columns.join(", "))
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Builds the model prompt for `request`.
    pub fn build_prompt(request: &str, schema: &SchemaContext) -> String {
        format!(
            "Tables: {} | Question: {} | SQL:",
            Self::table_context(schema),
            request
        )
    }
}

fn describe_column(column: &ColumnDescriptor) -> String {
    if column.nullable {
        format!("{} {}", column.name, column.data_type)
    } else {
        format!("{} {} NOT NULL", column.name, column.data_type)
    }
}

impl std::fmt::Debug for LearnedModelStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearnedModelStrategy").finish_non_exhaustive()
    }
}

impl SynthesisStrategy for LearnedModelStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn synthesize(&self, request: &str, schema: &SchemaContext) -> Result<String> {
        let prompt = Self::build_prompt(request, schema);
        tracing::trace!("Learned model prompt: {}", prompt);
        self.model.generate(&prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_context_format() {
        let schema = SchemaContext::new()
            .with_table(
                "customers",
                vec![
                    ColumnDescriptor::new("id", "integer", false),
                    ColumnDescriptor::new("email", "text", true),
                ],
            )
            .with_table("orders", vec![ColumnDescriptor::new("total", "numeric", true)]);

        assert_eq!(
            LearnedModelStrategy::table_context(&schema),
            "Table customers: id integer NOT NULL, email text | Table orders: total numeric"
        );
    }

    #[test]
    fn test_prompt_format() {
        let schema = SchemaContext::new().with_table("t", vec![]);
        assert_eq!(
            LearnedModelStrategy::build_prompt("how many rows", &schema),
            "Tables: Table t:  | Question: how many rows | SQL:"
        );
    }
}
