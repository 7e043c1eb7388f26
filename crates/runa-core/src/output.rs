// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::RunError;

/// Key used to wrap non-object output schemas, so that backends which
/// require a top-level object (strict mode does) can still return plain
/// numbers, strings or booleans. Unwrapped transparently after validation.
pub const RESPONSE_WRAPPER_KEY: &str = "response";

/// Describes the final-output contract of an agent.
///
/// Without a descriptor the loop treats concatenated assistant text as the
/// final output. With one, the model is asked for JSON matching
/// [`OutputSchema::json_schema`] and the first completed text output is fed
/// through [`OutputSchema::validate_json`].
pub trait OutputSchema: Send + Sync {
    fn name(&self) -> &str;

    fn is_plain_text(&self) -> bool {
        false
    }

    /// Whether the backend should enforce the schema on the wire. In
    /// non-strict mode validation is local only.
    fn is_strict_json_schema(&self) -> bool;

    fn json_schema(&self) -> Value;

    /// Validate the raw model text; a failure is a model behavior error.
    fn validate_json(&self, raw: &str) -> Result<Value, RunError>;
}

/// The default contract: plain text, no validation.
pub struct PlainText;

impl OutputSchema for PlainText {
    fn name(&self) -> &str {
        "text"
    }

    fn is_plain_text(&self) -> bool {
        true
    }

    fn is_strict_json_schema(&self) -> bool {
        false
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "string" })
    }

    fn validate_json(&self, raw: &str) -> Result<Value, RunError> {
        Ok(Value::String(raw.to_string()))
    }
}

/// An output type described by a hand-written JSON schema.
///
/// Non-object schemas are wrapped under [`RESPONSE_WRAPPER_KEY`] before the
/// model sees them and unwrapped after validation, so the wire contract is
/// always a top-level object. Validation parses the raw text; in strict
/// mode the backend already enforced the shape, in non-strict mode a parse
/// failure is all we can detect locally.
pub struct JsonSchemaOutput {
    name: String,
    schema: Value,
    strict: bool,
    wrapped: bool,
}

impl JsonSchemaOutput {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        let wrapped = schema.get("type").and_then(Value::as_str) != Some("object");
        let schema = if wrapped {
            json!({
                "type": "object",
                "properties": { RESPONSE_WRAPPER_KEY: schema },
                "required": [RESPONSE_WRAPPER_KEY],
                "additionalProperties": false
            })
        } else {
            schema
        };
        Self {
            name: name.into(),
            schema,
            strict: true,
            wrapped,
        }
    }

    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }
}

impl OutputSchema for JsonSchemaOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_strict_json_schema(&self) -> bool {
        self.strict
    }

    fn json_schema(&self) -> Value {
        self.schema.clone()
    }

    fn validate_json(&self, raw: &str) -> Result<Value, RunError> {
        let mut value: Value = serde_json::from_str(raw).map_err(|e| {
            RunError::ModelBehavior(format!("invalid JSON final output: {e}"))
        })?;
        if self.wrapped {
            value = value
                .as_object_mut()
                .and_then(|obj| obj.remove(RESPONSE_WRAPPER_KEY))
                .ok_or_else(|| {
                    RunError::ModelBehavior(format!(
                        "final output missing '{RESPONSE_WRAPPER_KEY}' wrapper key"
                    ))
                })?;
        }
        Ok(value)
    }
}

/// An output type validated by deserializing into `T`.
///
/// The schema is still hand-written (the way tool parameter schemas are);
/// deserialization is what enforces it locally.
struct TypedOutput<T> {
    inner: JsonSchemaOutput,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Send + Sync> OutputSchema for TypedOutput<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_strict_json_schema(&self) -> bool {
        self.inner.is_strict_json_schema()
    }

    fn json_schema(&self) -> Value {
        self.inner.json_schema()
    }

    fn validate_json(&self, raw: &str) -> Result<Value, RunError> {
        let value = self.inner.validate_json(raw)?;
        let _: T = serde_json::from_value(value.clone()).map_err(|e| {
            RunError::ModelBehavior(format!("final output does not match schema: {e}"))
        })?;
        Ok(value)
    }
}

/// Build an output type that deserializes into `T` for validation.
pub fn typed_output<T: DeserializeOwned + Send + Sync + 'static>(
    name: impl Into<String>,
    schema: Value,
) -> Arc<dyn OutputSchema> {
    Arc::new(TypedOutput::<T> {
        inner: JsonSchemaOutput::new(name, schema),
        _marker: PhantomData,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[test]
    fn plain_text_passes_anything_through() {
        let schema = PlainText;
        assert!(schema.is_plain_text());
        let out = schema.validate_json("anything at all").unwrap();
        assert_eq!(out, Value::String("anything at all".into()));
    }

    #[test]
    fn object_schema_is_not_wrapped() {
        let schema = JsonSchemaOutput::new(
            "answer",
            json!({ "type": "object", "properties": { "number": { "type": "integer" } } }),
        );
        let out = schema.validate_json(r#"{"number": 7}"#).unwrap();
        assert_eq!(out, json!({ "number": 7 }));
    }

    #[test]
    fn primitive_schema_is_wrapped_and_unwrapped() {
        let schema = JsonSchemaOutput::new("flag", json!({ "type": "boolean" }));
        let wire = schema.json_schema();
        assert_eq!(wire["type"], "object");
        assert!(wire["properties"][RESPONSE_WRAPPER_KEY].is_object());
        let out = schema.validate_json(r#"{"response": true}"#).unwrap();
        assert_eq!(out, Value::Bool(true));
    }

    #[test]
    fn missing_wrapper_key_is_model_behavior() {
        let schema = JsonSchemaOutput::new("flag", json!({ "type": "boolean" }));
        let err = schema.validate_json(r#"{"other": true}"#).unwrap_err();
        assert!(matches!(err, RunError::ModelBehavior(_)));
    }

    #[test]
    fn invalid_json_is_model_behavior() {
        let schema = JsonSchemaOutput::new("answer", json!({ "type": "object" }));
        let err = schema.validate_json("not-json").unwrap_err();
        assert!(matches!(err, RunError::ModelBehavior(_)));
    }

    #[test]
    fn strict_by_default_non_strict_opt_out() {
        let strict = JsonSchemaOutput::new("a", json!({ "type": "object" }));
        assert!(strict.is_strict_json_schema());
        let lax = JsonSchemaOutput::new("a", json!({ "type": "object" })).non_strict();
        assert!(!lax.is_strict_json_schema());
    }

    #[derive(Deserialize)]
    struct Answer {
        number: i64,
    }

    #[test]
    fn typed_output_enforces_field_types() {
        let schema = typed_output::<Answer>(
            "answer",
            json!({
                "type": "object",
                "properties": { "number": { "type": "integer" } },
                "required": ["number"],
                "additionalProperties": false
            }),
        );
        assert!(schema.validate_json(r#"{"number": 3}"#).is_ok());
        let err = schema.validate_json(r#"{"number": "three"}"#).unwrap_err();
        assert!(matches!(err, RunError::ModelBehavior(_)));
    }
}
