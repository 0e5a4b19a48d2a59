//! Tool Input Schemas
//!
//! A tool's input schema is a flat list of typed field descriptors. The
//! descriptors render to the JSON-Schema shape advertised over the wire and
//! validate incoming arguments at call time, without pulling in a schema
//! library.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ArmatureError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        }
    }
}

/// One named, typed input field.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
}

/// The typed field list describing a tool's arguments.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolSchema {
    pub fields: Vec<FieldSpec>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add a required field.
    pub fn field(mut self, name: &str, field_type: FieldType, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            field_type,
            description: if description.is_empty() {
                None
            } else {
                Some(description.to_string())
            },
            required: true,
        });
        self
    }

    /// Add an optional field.
    pub fn optional_field(
        mut self,
        name: &str,
        field_type: FieldType,
        description: &str,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            field_type,
            description: if description.is_empty() {
                None
            } else {
                Some(description.to_string())
            },
            required: false,
        });
        self
    }

    /// Render the JSON-Schema object advertised in `tools/list` and handed
    /// to the LLM as function parameters.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required: Vec<Value> = Vec::new();

        for field in &self.fields {
            let mut prop = Map::new();
            prop.insert("type".to_string(), json!(field.field_type.label()));
            if let Some(ref desc) = field.description {
                prop.insert("description".to_string(), json!(desc));
            }
            properties.insert(field.name.clone(), Value::Object(prop));
            if field.required {
                required.push(json!(field.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Rebuild a field list from an advertised JSON-Schema object.
    ///
    /// Unknown property types fall back to `string` so a registry can still
    /// echo a foreign server's tools to the LLM.
    pub fn from_json_schema(value: &Value) -> Self {
        let required: Vec<String> = value["required"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let mut fields = Vec::new();
        if let Some(props) = value["properties"].as_object() {
            for (name, prop) in props {
                let field_type = match prop["type"].as_str() {
                    Some("number") | Some("integer") => FieldType::Number,
                    Some("boolean") => FieldType::Boolean,
                    _ => FieldType::String,
                };
                fields.push(FieldSpec {
                    name: name.clone(),
                    field_type,
                    description: prop["description"].as_str().map(|s| s.to_string()),
                    required: required.iter().any(|r| r == name),
                });
            }
        }

        Self { fields }
    }

    /// Validate an argument map against the field list.
    ///
    /// Required fields must be present and non-null with the declared type;
    /// optional fields are type-checked only when present. Keys the schema
    /// does not mention are ignored.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<()> {
        for field in &self.fields {
            match args.get(&field.name) {
                Some(Value::Null) | None => {
                    if field.required {
                        return Err(ArmatureError::validation(format!(
                            "missing required field '{}'",
                            field.name
                        )));
                    }
                }
                Some(value) => {
                    if !field.field_type.matches(value) {
                        return Err(ArmatureError::validation(format!(
                            "field '{}' must be a {}",
                            field.name,
                            field.field_type.label()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
