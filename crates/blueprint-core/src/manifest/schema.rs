//! The embedded JSON schema for `blueprint.json`.

use crate::error::ValidationIssue;
use jsonschema::Validator;
use serde_json::Value;
use std::sync::OnceLock;

/// Schema source as shipped in the binary. `blueprint update` also writes a
/// copy to `.blueprint/schema.json` for editor completion.
pub const SCHEMA_JSON: &str = include_str!("schema.json");

static VALIDATOR: OnceLock<Validator> = OnceLock::new();

fn validator() -> &'static Validator {
    VALIDATOR.get_or_init(|| {
        let schema: Value =
            serde_json::from_str(SCHEMA_JSON).expect("embedded schema is valid JSON");
        jsonschema::options()
            .should_validate_formats(true)
            .build(&schema)
            .expect("embedded schema compiles")
    })
}

/// Check `instance` against the schema, one issue per violation.
pub fn check(instance: &Value) -> Vec<ValidationIssue> {
    validator()
        .iter_errors(instance)
        .map(|err| {
            let path = err.instance_path.to_string();
            let at = if path.is_empty() { "/".to_string() } else { path };
            ValidationIssue::schema(format!("{at}: {err}"))
        })
        .collect()
}
