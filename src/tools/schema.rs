// src/tools/schema.rs
// Declared parameter schemas for tools (spec §3 "Tool descriptor":
// `parameter_schema` (field -> {type, required, constraints})), with
// validation and the spec's limited argument coercion (§6.2: "trimming
// whitespace on string fields and ISO-8601 parsing for declared timestamp
// fields; no other implicit conversion"). Grounded on the teacher's
// `ToolBuilder`/`properties` module
// (examples/ConaryLabs-Mira/backend/src/operations/tool_builder.rs) for
// the JSON-schema shape, extended here with the runtime validation the
// teacher leaves to the model server.

use chrono::DateTime;
use serde_json::{json, Map, Value};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    fn json_type_name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub field_type: FieldType,
    pub required: bool,
    pub description: String,
    pub enum_values: Option<Vec<String>>,
    /// Declared timestamp fields get ISO-8601 parse validation at
    /// coercion time (spec §6.2).
    pub is_timestamp: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ParameterSchema {
    fields: Vec<(String, FieldSchema)>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.push((name.into(), schema));
        self
    }

    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, field) in &self.fields {
            let mut prop = json!({
                "type": field.field_type.json_type_name(),
                "description": field.description,
            });
            if let Some(values) = &field.enum_values {
                prop["enum"] = json!(values);
            }
            properties.insert(name.clone(), prop);
            if field.required {
                required.push(name.clone());
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validates `arguments` against the declared schema and returns a
    /// coerced copy: string fields trimmed, declared timestamp fields
    /// checked for ISO-8601 parseability (spec §6.2). Missing required
    /// fields or type/range violations are `InvalidArgument` (spec §4.5
    /// "Contract for every tool").
    pub fn validate(&self, arguments: &Value) -> Result<Value, CoreError> {
        let Some(obj) = arguments.as_object() else {
            return Err(CoreError::invalid_argument("tool arguments must be a JSON object"));
        };

        let mut coerced = obj.clone();

        for (name, field) in &self.fields {
            match coerced.get(name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(CoreError::invalid_argument(format!(
                            "missing required field: {name}"
                        )));
                    }
                }
                Some(value) => {
                    if !field.field_type.matches(value) {
                        return Err(CoreError::invalid_argument(format!(
                            "field {name} must be of type {}",
                            field.field_type.json_type_name()
                        )));
                    }

                    if let (FieldType::String, Some(s)) = (field.field_type, value.as_str()) {
                        let trimmed = s.trim();

                        if field.is_timestamp
                            && !trimmed.is_empty()
                            && DateTime::parse_from_rfc3339(trimmed).is_err()
                        {
                            return Err(CoreError::invalid_argument(format!(
                                "field {name} must be an ISO-8601 timestamp"
                            )));
                        }

                        if let Some(values) = &field.enum_values {
                            if !values.iter().any(|v| v == trimmed) {
                                return Err(CoreError::invalid_argument(format!(
                                    "field {name} must be one of {values:?}"
                                )));
                            }
                        }

                        coerced.insert(name.clone(), Value::String(trimmed.to_string()));
                    }
                }
            }
        }

        Ok(Value::Object(coerced))
    }
}

pub mod fields {
    use super::{FieldSchema, FieldType};

    pub fn required_string(description: &str) -> FieldSchema {
        FieldSchema {
            field_type: FieldType::String,
            required: true,
            description: description.to_string(),
            enum_values: None,
            is_timestamp: false,
        }
    }

    pub fn optional_string(description: &str) -> FieldSchema {
        FieldSchema {
            field_type: FieldType::String,
            required: false,
            description: description.to_string(),
            enum_values: None,
            is_timestamp: false,
        }
    }

    pub fn required_enum(description: &str, values: &[&str]) -> FieldSchema {
        FieldSchema {
            field_type: FieldType::String,
            required: true,
            description: description.to_string(),
            enum_values: Some(values.iter().map(|s| s.to_string()).collect()),
            is_timestamp: false,
        }
    }

    pub fn optional_enum(description: &str, values: &[&str]) -> FieldSchema {
        FieldSchema {
            field_type: FieldType::String,
            required: false,
            description: description.to_string(),
            enum_values: Some(values.iter().map(|s| s.to_string()).collect()),
            is_timestamp: false,
        }
    }

    pub fn optional_timestamp(description: &str) -> FieldSchema {
        FieldSchema {
            field_type: FieldType::String,
            required: false,
            description: description.to_string(),
            enum_values: None,
            is_timestamp: true,
        }
    }

    pub fn required_timestamp(description: &str) -> FieldSchema {
        FieldSchema {
            field_type: FieldType::String,
            required: true,
            description: description.to_string(),
            enum_values: None,
            is_timestamp: true,
        }
    }

    pub fn optional_integer(description: &str) -> FieldSchema {
        FieldSchema {
            field_type: FieldType::Integer,
            required: false,
            description: description.to_string(),
            enum_values: None,
            is_timestamp: false,
        }
    }

    pub fn optional_boolean(description: &str) -> FieldSchema {
        FieldSchema {
            field_type: FieldType::Boolean,
            required: false,
            description: description.to_string(),
            enum_values: None,
            is_timestamp: false,
        }
    }

    pub fn optional_object(description: &str) -> FieldSchema {
        FieldSchema {
            field_type: FieldType::Object,
            required: false,
            description: description.to_string(),
            enum_values: None,
            is_timestamp: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trims_whitespace_on_string_fields() {
        let schema = ParameterSchema::new().field("name", fields::required_string("name"));
        let coerced = schema.validate(&json!({"name": "  salmon sashimi  "})).unwrap();
        assert_eq!(coerced["name"], json!("salmon sashimi"));
    }

    #[test]
    fn missing_required_field_is_invalid_argument() {
        let schema = ParameterSchema::new().field("name", fields::required_string("name"));
        let err = schema.validate(&json!({})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn rejects_bad_timestamp() {
        let schema = ParameterSchema::new().field("due_at", fields::required_timestamp("due"));
        let err = schema.validate(&json!({"due_at": "not-a-date"})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn accepts_valid_iso8601_timestamp() {
        let schema = ParameterSchema::new().field("due_at", fields::required_timestamp("due"));
        let coerced = schema
            .validate(&json!({"due_at": "2026-08-04T00:00:00Z"}))
            .unwrap();
        assert!(coerced["due_at"].is_string());
    }
}
