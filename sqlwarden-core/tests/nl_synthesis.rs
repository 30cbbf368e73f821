//! Natural-language synthesis tests.
//!
//! This test suite covers:
//! - The rule-based strategy against the customers/orders schema
//! - Learned-model output cleaning, validation and fallback
//! - Synthesized SQL passing through the gate

use sqlwarden_core::config::GateConfig;
use sqlwarden_core::gate::QueryGate;
use sqlwarden_core::models::{ColumnDescriptor, Dialect, SchemaContext};
use sqlwarden_core::synth::{LearnedModelStrategy, NlSynthesizer, TextToSqlModel};
use sqlwarden_core::{Result, SqlWardenError};
use std::sync::{Arc, Mutex};

fn shop_schema() -> SchemaContext {
    SchemaContext::new()
        .with_table(
            "customers",
            vec![
                ColumnDescriptor::new("id", "integer", false),
                ColumnDescriptor::new("name", "text", true),
            ],
        )
        .with_table("orders", vec![ColumnDescriptor::new("id", "integer", false)])
}

#[test]
fn test_rule_based_examples() {
    let synthesizer = NlSynthesizer::rule_based();
    let schema = shop_schema();

    let cases = [
        ("show all customers", "SELECT * FROM customers"),
        ("count all orders", "SELECT COUNT(*) as count FROM orders"),
        ("show top 5 customers", "SELECT * FROM customers LIMIT 5"),
        ("first orders please", "SELECT * FROM orders LIMIT 10"),
        ("what is the weather", "SELECT * FROM customers"),
    ];

    for (request, expected) in cases {
        assert_eq!(
            synthesizer.synthesize(request, &schema).unwrap(),
            expected,
            "request: {request}"
        );
    }
}

#[test]
fn test_empty_schema_has_no_tables() {
    let result = NlSynthesizer::rule_based().synthesize("show all customers", &SchemaContext::new());
    assert!(matches!(result, Err(SqlWardenError::NoTablesAvailable)));
}

#[test]
fn test_missing_hinted_table_falls_back_to_first() {
    let schema = SchemaContext::new().with_table("invoices", vec![]);
    assert_eq!(
        NlSynthesizer::rule_based()
            .synthesize("count customers", &schema)
            .unwrap(),
        "SELECT COUNT(*) as count FROM invoices"
    );
}

/// Model stub that records the prompts it receives.
struct RecordingModel {
    output: &'static str,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl TextToSqlModel for RecordingModel {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.output.to_string())
    }
}

#[test]
fn test_learned_model_receives_schema_prompt() {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let model = RecordingModel {
        output: "  SELECT name\nFROM customers WHERE id = 1;",
        prompts: Arc::clone(&prompts),
    };
    let synthesizer = NlSynthesizer::new(Some(Box::new(model)));

    let sql = synthesizer
        .synthesize("name of customer 1", &shop_schema())
        .unwrap();
    assert_eq!(sql, "SELECT name FROM customers WHERE id = 1");

    let prompts = prompts.lock().unwrap();
    assert_eq!(
        prompts.as_slice(),
        [
            "Tables: Table customers: id integer NOT NULL, name text | Table orders: id integer NOT NULL | Question: name of customer 1 | SQL:"
        ]
    );
    assert_eq!(
        prompts[0],
        LearnedModelStrategy::build_prompt("name of customer 1", &shop_schema())
    );
}

#[test]
fn test_learned_model_destructive_output_is_discarded() {
    let model = RecordingModel {
        output: "SELECT * FROM customers; DROP TABLE customers",
        prompts: Arc::default(),
    };
    let synthesizer = NlSynthesizer::new(Some(Box::new(model)));
    assert_eq!(
        synthesizer.synthesize("show all orders", &shop_schema()).unwrap(),
        "SELECT * FROM orders"
    );
}

#[test]
fn test_synthesized_sql_is_gated_and_bounded() {
    let gate = QueryGate::new(Dialect::Mssql, GateConfig::default());
    let prepared = gate
        .prepare_nl("show all customers", &shop_schema(), Some(3))
        .unwrap();

    assert_eq!(prepared.original, "SELECT * FROM customers");
    assert_eq!(
        prepared.rewritten,
        "SELECT TOP 3 * FROM (SELECT * FROM customers) AS _sub"
    );
}
