//! Unmarshal stage - prepares OpenAPI schemas for a context and validates
//! cast values against them.
//!
//! OpenAPI schema objects are close to JSON Schema but not identical. Before
//! validation a schema is rewritten:
//!
//! | OpenAPI                              | JSON Schema                                 |
//! |--------------------------------------|---------------------------------------------|
//! | `nullable: true`                     | `null` added to `type` (and `enum`)         |
//! | `exclusiveMinimum: true` + `minimum` | `exclusiveMinimum: <minimum>`               |
//! | `readOnly` property (request)        | property schema `false`, dropped from `required` |
//! | `writeOnly` property (response)      | property schema `false`, dropped from `required` |

use std::sync::OnceLock;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{SchemaError, ValidationError};
use crate::types::UnmarshalContext;

const DRAFT_2020_12: &str = "https://json-schema.org/draft/2020-12/schema";

/// Validates values against schemas for one context.
///
/// Holds the spec's `components` object so `$ref`s left in a schema (cyclic
/// definitions) still resolve. The components are rewritten for the context
/// once, on first use, and reused for every value after that.
#[derive(Debug, Clone)]
pub struct SchemaUnmarshaller<'s> {
    components: &'s Value,
    context: UnmarshalContext,
    strict: bool,
    prepared_components: OnceLock<Value>,
}

impl<'s> SchemaUnmarshaller<'s> {
    /// Create an unmarshaller for `context`.
    pub fn new(components: &'s Value, context: UnmarshalContext) -> Self {
        Self {
            components,
            context,
            strict: false,
            prepared_components: OnceLock::new(),
        }
    }

    /// Set strict mode (additionalProperties: false on all objects).
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self.prepared_components = OnceLock::new();
        self
    }

    /// Validate `value` against `schema` and return it.
    ///
    /// `format` is asserted, not just annotated: a `date` that isn't a date
    /// is a violation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Unmarshal` if the schema itself can't be
    /// compiled, or `ValidationError::InvalidSchemaValue` with every
    /// violation if the value doesn't match.
    pub fn unmarshal(&self, schema: &Value, value: Value) -> Result<Value, ValidationError> {
        let mut prepared = prepare_schema(schema, self.context, self.strict);

        if let Value::Object(root) = &mut prepared {
            root.insert("$schema".to_string(), Value::String(DRAFT_2020_12.into()));
            if !self.components.is_null() && !root.contains_key("components") {
                root.insert("components".to_string(), self.components().clone());
            }
        }

        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(&prepared)
            .map_err(|e| ValidationError::Unmarshal {
                message: e.to_string(),
            })?;

        let errors: Vec<SchemaError> = validator
            .iter_errors(&value)
            .map(|e| SchemaError {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if errors.is_empty() {
            Ok(value)
        } else {
            debug!(
                context = ?self.context,
                violations = errors.len(),
                "value rejected by schema"
            );
            Err(ValidationError::InvalidSchemaValue { errors })
        }
    }

    fn components(&self) -> &Value {
        self.prepared_components
            .get_or_init(|| prepare_components(self.components, self.context, self.strict))
    }
}

/// Rewrite an OpenAPI schema into a JSON Schema for `context`.
///
/// When `strict` is true, object schemas without an explicit
/// `additionalProperties` schema are closed.
pub fn prepare_schema(schema: &Value, context: UnmarshalContext, strict: bool) -> Value {
    let mut prepared = prepare_value(schema, context);
    if strict {
        close_additional_properties(&mut prepared);
    }
    prepared
}

/// Prepare every schema under `components.schemas` so `$ref` targets get the
/// same rewrite as inline schemas.
fn prepare_components(components: &Value, context: UnmarshalContext, strict: bool) -> Value {
    let mut prepared = components.clone();
    if let Some(Value::Object(schemas)) = prepared.get_mut("schemas") {
        for schema in schemas.values_mut() {
            *schema = prepare_schema(schema, context, strict);
        }
    }
    prepared
}

fn prepare_value(value: &Value, context: UnmarshalContext) -> Value {
    match value {
        Value::Object(map) => prepare_object(map, context),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| prepare_value(v, context)).collect()),
        other => other.clone(),
    }
}

fn prepare_object(map: &Map<String, Value>, context: UnmarshalContext) -> Value {
    let mut result = Map::new();
    let mut required: Vec<String> = map
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    for (key, value) in map {
        match key.as_str() {
            "properties" => {
                let prepared = prepare_properties(value, context, &mut required);
                result.insert(key.clone(), prepared);
            }
            // Literal values, not schemas
            "enum" | "const" | "default" | "example" | "examples" => {
                result.insert(key.clone(), value.clone());
            }
            "nullable" | "required" | "discriminator" | "xml" | "externalDocs" => continue,
            _ => {
                result.insert(key.clone(), prepare_value(value, context));
            }
        }
    }

    if map.contains_key("required") {
        result.insert(
            "required".to_string(),
            Value::Array(required.into_iter().map(Value::String).collect()),
        );
    }

    if map.get("nullable").and_then(Value::as_bool) == Some(true) {
        allow_null(&mut result);
    }
    convert_exclusive_bound(&mut result, "exclusiveMinimum", "minimum");
    convert_exclusive_bound(&mut result, "exclusiveMaximum", "maximum");

    Value::Object(result)
}

fn prepare_properties(value: &Value, context: UnmarshalContext, required: &mut Vec<String>) -> Value {
    let Some(props) = value.as_object() else {
        return value.clone();
    };

    let forbidden = context.forbidden_keyword();
    let mut result = Map::new();

    for (name, prop) in props {
        let hidden = prop.get(forbidden).and_then(Value::as_bool) == Some(true);
        if hidden {
            // Property must not be sent in this direction
            required.retain(|r| r != name);
            result.insert(name.clone(), Value::Bool(false));
        } else {
            result.insert(name.clone(), prepare_value(prop, context));
        }
    }

    Value::Object(result)
}

fn allow_null(schema: &mut Map<String, Value>) {
    let widened = match schema.get("type") {
        Some(Value::String(t)) => Some(Value::Array(vec![
            Value::String(t.clone()),
            Value::String("null".into()),
        ])),
        Some(Value::Array(types)) if !types.iter().any(|t| t == "null") => {
            let mut types = types.clone();
            types.push(Value::String("null".into()));
            Some(Value::Array(types))
        }
        _ => None,
    };
    if let Some(widened) = widened {
        schema.insert("type".to_string(), widened);
    }

    if let Some(Value::Array(values)) = schema.get_mut("enum") {
        if !values.contains(&Value::Null) {
            values.push(Value::Null);
        }
    }
}

/// OpenAPI 3.0 spells exclusive bounds as a boolean next to the bound.
fn convert_exclusive_bound(schema: &mut Map<String, Value>, exclusive: &str, bound: &str) {
    match schema.get(exclusive) {
        Some(Value::Bool(true)) => match schema.remove(bound) {
            Some(limit) => {
                schema.insert(exclusive.to_string(), limit);
            }
            None => {
                schema.remove(exclusive);
            }
        },
        Some(Value::Bool(false)) => {
            schema.remove(exclusive);
        }
        _ => {}
    }
}

/// Recursively set `additionalProperties: false` on all object schemas.
///
/// Only sets the value if `additionalProperties` is missing or explicitly `true`.
/// Custom `additionalProperties` schemas are left untouched.
fn close_additional_properties(value: &mut Value) {
    if let Value::Object(map) = value {
        let is_object_schema = map
            .get("type")
            .and_then(|t| t.as_str())
            .map(|t| t == "object")
            .unwrap_or(false)
            || map.contains_key("properties");

        if is_object_schema {
            match map.get("additionalProperties") {
                None | Some(Value::Bool(true)) => {
                    map.insert("additionalProperties".to_string(), Value::Bool(false));
                }
                _ => {}
            }
        }

        for (key, child) in map.iter_mut() {
            match key.as_str() {
                "properties" => {
                    if let Value::Object(props) = child {
                        for prop_value in props.values_mut() {
                            close_additional_properties(prop_value);
                        }
                    }
                }
                "items" | "additionalProperties" => close_additional_properties(child),
                "allOf" | "anyOf" | "oneOf" => {
                    if let Value::Array(arr) = child {
                        for item in arr {
                            close_additional_properties(item);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pet_schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "name", "secret"],
            "properties": {
                "id": { "type": "integer", "readOnly": true },
                "name": { "type": "string" },
                "secret": { "type": "string", "writeOnly": true }
            }
        })
    }

    // === Schema Preparation Tests ===

    #[test]
    fn request_forbids_read_only() {
        let prepared = prepare_schema(&pet_schema(), UnmarshalContext::Request, false);
        assert_eq!(prepared["properties"]["id"], json!(false));
        assert_eq!(prepared["required"], json!(["name", "secret"]));
        assert_eq!(prepared["properties"]["secret"]["type"], "string");
    }

    #[test]
    fn response_forbids_write_only() {
        let prepared = prepare_schema(&pet_schema(), UnmarshalContext::Response, false);
        assert_eq!(prepared["properties"]["secret"], json!(false));
        assert_eq!(prepared["required"], json!(["id", "name"]));
    }

    #[test]
    fn nullable_adds_null_type() {
        let schema = json!({ "type": "string", "nullable": true, "enum": ["a", "b"] });
        let prepared = prepare_schema(&schema, UnmarshalContext::Response, false);
        assert_eq!(prepared["type"], json!(["string", "null"]));
        assert_eq!(prepared["enum"], json!(["a", "b", null]));
        assert!(prepared.get("nullable").is_none());
    }

    #[test]
    fn exclusive_bounds_converted() {
        let schema = json!({ "type": "integer", "minimum": 0, "exclusiveMinimum": true });
        let prepared = prepare_schema(&schema, UnmarshalContext::Request, false);
        assert_eq!(prepared["exclusiveMinimum"], json!(0));
        assert!(prepared.get("minimum").is_none());

        let schema = json!({ "type": "integer", "maximum": 9, "exclusiveMaximum": false });
        let prepared = prepare_schema(&schema, UnmarshalContext::Request, false);
        assert_eq!(prepared["maximum"], json!(9));
        assert!(prepared.get("exclusiveMaximum").is_none());
    }

    #[test]
    fn enum_values_are_not_rewritten() {
        let schema = json!({ "enum": [{ "nullable": true }] });
        let prepared = prepare_schema(&schema, UnmarshalContext::Request, false);
        assert_eq!(prepared["enum"], json!([{ "nullable": true }]));
    }

    #[test]
    fn strict_closes_objects() {
        let schema = json!({
            "type": "object",
            "properties": {
                "tags": { "type": "object" },
                "extra": { "type": "object", "additionalProperties": { "type": "string" } }
            }
        });
        let prepared = prepare_schema(&schema, UnmarshalContext::Response, true);
        assert_eq!(prepared["additionalProperties"], json!(false));
        assert_eq!(prepared["properties"]["tags"]["additionalProperties"], json!(false));
        assert_eq!(
            prepared["properties"]["extra"]["additionalProperties"],
            json!({ "type": "string" })
        );
    }

    // === Validation Tests ===

    #[test]
    fn valid_value_is_returned() {
        let components = Value::Null;
        let unmarshaller = SchemaUnmarshaller::new(&components, UnmarshalContext::Response);
        let value = json!({ "id": 1, "name": "rex" });
        let schema = json!({
            "type": "object",
            "properties": { "id": { "type": "integer" }, "name": { "type": "string" } }
        });
        assert_eq!(unmarshaller.unmarshal(&schema, value.clone()).unwrap(), value);
    }

    #[test]
    fn collects_every_violation() {
        let components = Value::Null;
        let unmarshaller = SchemaUnmarshaller::new(&components, UnmarshalContext::Response);
        let schema = json!({
            "type": "object",
            "required": ["id", "name"],
            "properties": { "id": { "type": "integer" }, "name": { "type": "string" } }
        });
        match unmarshaller.unmarshal(&schema, json!({ "id": "x" })) {
            Err(ValidationError::InvalidSchemaValue { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("expected schema violations, got {:?}", other),
        }
    }

    #[test]
    fn write_only_rejected_in_response() {
        let components = Value::Null;
        let unmarshaller = SchemaUnmarshaller::new(&components, UnmarshalContext::Response);
        let result = unmarshaller.unmarshal(
            &pet_schema(),
            json!({ "id": 1, "name": "rex", "secret": "hunter2" }),
        );
        assert!(matches!(result, Err(ValidationError::InvalidSchemaValue { .. })));

        let result = unmarshaller.unmarshal(&pet_schema(), json!({ "id": 1, "name": "rex" }));
        assert!(result.is_ok());
    }

    #[test]
    fn format_is_asserted() {
        let components = Value::Null;
        let unmarshaller = SchemaUnmarshaller::new(&components, UnmarshalContext::Response);
        let schema = json!({
            "type": "object",
            "properties": {
                "born": { "type": "string", "format": "date" },
                "mail": { "type": "string", "format": "email" }
            }
        });

        match unmarshaller.unmarshal(&schema, json!({ "born": "not-a-date", "mail": "nope" })) {
            Err(ValidationError::InvalidSchemaValue { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert_eq!(paths.len(), 2);
                assert!(paths.contains(&"/born"));
                assert!(paths.contains(&"/mail"));
            }
            other => panic!("expected format violations, got {:?}", other),
        }

        let valid = json!({ "born": "2020-02-29", "mail": "rex@petstore.test" });
        assert_eq!(unmarshaller.unmarshal(&schema, valid.clone()).unwrap(), valid);
    }

    #[test]
    fn components_prepared_once_per_unmarshaller() {
        let components = json!({
            "schemas": {
                "Pet": {
                    "type": "object",
                    "properties": { "secret": { "type": "string", "writeOnly": true } }
                }
            }
        });
        let unmarshaller = SchemaUnmarshaller::new(&components, UnmarshalContext::Response);
        let schema = json!({ "$ref": "#/components/schemas/Pet" });

        assert!(unmarshaller.unmarshal(&schema, json!({})).is_ok());
        let first = unmarshaller.components() as *const Value;
        assert!(unmarshaller
            .unmarshal(&schema, json!({ "secret": "x" }))
            .is_err());
        assert_eq!(unmarshaller.components() as *const Value, first);
        assert_eq!(
            unmarshaller.components()["schemas"]["Pet"]["properties"]["secret"],
            json!(false)
        );
    }

    #[test]
    fn strict_reprepares_components() {
        let components = json!({ "schemas": { "Tag": { "type": "object" } } });
        let unmarshaller = SchemaUnmarshaller::new(&components, UnmarshalContext::Request);
        assert!(unmarshaller.components()["schemas"]["Tag"]
            .get("additionalProperties")
            .is_none());

        let unmarshaller = unmarshaller.strict(true);
        assert_eq!(
            unmarshaller.components()["schemas"]["Tag"]["additionalProperties"],
            json!(false)
        );
    }

    #[test]
    fn leftover_refs_resolve_against_components() {
        let components = json!({
            "schemas": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "value": { "type": "integer" },
                        "next": { "$ref": "#/components/schemas/Node" }
                    }
                }
            }
        });
        let unmarshaller = SchemaUnmarshaller::new(&components, UnmarshalContext::Response);
        let schema = json!({ "$ref": "#/components/schemas/Node" });

        assert!(unmarshaller
            .unmarshal(&schema, json!({ "value": 1, "next": { "value": 2 } }))
            .is_ok());
        assert!(unmarshaller
            .unmarshal(&schema, json!({ "value": 1, "next": { "value": "two" } }))
            .is_err());
    }
}
