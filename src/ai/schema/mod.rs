//! Schema Descriptions
//!
//! Declarative shape descriptions for flow inputs, flow outputs and tool
//! payloads. A schema is a plain value (tagged union of field kinds) consumed
//! by one generic [`validate`] function, and exported as JSON Schema when a
//! backend needs to see it.
//!
//! ```ignore
//! let schema = ObjectSchema::new()
//!     .field(Field::required("petType", FieldKind::enumeration(["dog", "cat"])))
//!     .field(Field::optional("age", FieldKind::number().min(0.0)));
//! let normalized = schema.validate(&json!({"petType": "dog", "age": "3"}))?;
//! ```

mod validator;

pub use validator::validate;

use serde_json::{Map, Value, json};

use crate::types::ValidationError;

/// Semantic type of a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    },
    Boolean,
    Enum(Vec<String>),
    Array(Box<FieldKind>),
    Object(ObjectSchema),
}

impl FieldKind {
    pub fn string() -> Self {
        FieldKind::String {
            min_len: None,
            max_len: None,
        }
    }

    pub fn number() -> Self {
        FieldKind::Number {
            min: None,
            max: None,
            integer: false,
        }
    }

    pub fn integer() -> Self {
        FieldKind::Number {
            min: None,
            max: None,
            integer: true,
        }
    }

    pub fn boolean() -> Self {
        FieldKind::Boolean
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldKind::Enum(values.into_iter().map(Into::into).collect())
    }

    pub fn array_of(item: FieldKind) -> Self {
        FieldKind::Array(Box::new(item))
    }

    pub fn object(schema: ObjectSchema) -> Self {
        FieldKind::Object(schema)
    }

    /// Minimum string length (no-op on other kinds)
    pub fn min_len(mut self, len: usize) -> Self {
        if let FieldKind::String { min_len, .. } = &mut self {
            *min_len = Some(len);
        }
        self
    }

    /// Maximum string length (no-op on other kinds)
    pub fn max_len(mut self, len: usize) -> Self {
        if let FieldKind::String { max_len, .. } = &mut self {
            *max_len = Some(len);
        }
        self
    }

    /// Inclusive lower bound (no-op on non-numeric kinds)
    pub fn min(mut self, bound: f64) -> Self {
        if let FieldKind::Number { min, .. } = &mut self {
            *min = Some(bound);
        }
        self
    }

    /// Inclusive upper bound (no-op on non-numeric kinds)
    pub fn max(mut self, bound: f64) -> Self {
        if let FieldKind::Number { max, .. } = &mut self {
            *max = Some(bound);
        }
        self
    }

    /// Name used in error messages and JSON Schema `type`
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String { .. } | FieldKind::Enum(_) => "string",
            FieldKind::Number { integer: true, .. } => "integer",
            FieldKind::Number { .. } => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array(_) => "array",
            FieldKind::Object(_) => "object",
        }
    }

    fn to_json_schema(&self) -> Value {
        let mut out = Map::new();
        out.insert("type".into(), json!(self.type_name()));

        match self {
            FieldKind::String { min_len, max_len } => {
                if let Some(min) = min_len {
                    out.insert("minLength".into(), json!(min));
                }
                if let Some(max) = max_len {
                    out.insert("maxLength".into(), json!(max));
                }
            }
            FieldKind::Number { min, max, .. } => {
                if let Some(min) = min {
                    out.insert("minimum".into(), json!(min));
                }
                if let Some(max) = max {
                    out.insert("maximum".into(), json!(max));
                }
            }
            FieldKind::Enum(values) => {
                out.insert("enum".into(), json!(values));
            }
            FieldKind::Array(item) => {
                out.insert("items".into(), item.to_json_schema());
            }
            FieldKind::Object(schema) => return schema.to_json_schema(),
            FieldKind::Boolean => {}
        }

        Value::Object(out)
    }
}

/// One declared field of an object schema
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub optional: bool,
    /// Value substituted when the field is absent; implies optional
    pub default: Option<Value>,
    /// Natural-language description shown to the model
    pub description: Option<String>,
}

impl Field {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            default: None,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            optional: true,
            ..Self::required(name, kind)
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.optional = true;
        self.default = Some(value);
        self
    }
}

/// Shape of a structured value: an ordered list of declared fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    fields: Vec<Field>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Validate and normalize `value` against this schema
    pub fn validate(&self, value: &Value) -> Result<Value, Vec<ValidationError>> {
        validate(self, value)
    }

    /// Export as JSON Schema (draft-07 subset) for backend consumption
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut prop = field.kind.to_json_schema();
            if let Value::Object(map) = &mut prop {
                if let Some(description) = &field.description {
                    map.insert("description".into(), json!(description));
                }
                if let Some(default) = &field.default {
                    map.insert("default".into(), default.clone());
                }
            }
            properties.insert(field.name.clone(), prop);
            if !field.optional {
                required.push(field.name.clone());
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pet_schema() -> ObjectSchema {
        ObjectSchema::new()
            .field(
                Field::required("petType", FieldKind::enumeration(["dog", "cat"]))
                    .describe("The type of pet"),
            )
            .field(Field::optional("age", FieldKind::number().min(0.0)))
            .field(
                Field::optional("count", FieldKind::integer().min(1.0).max(20.0))
                    .default_value(json!(10)),
            )
            .field(Field::optional(
                "names",
                FieldKind::array_of(FieldKind::string().min_len(1)),
            ))
    }

    #[test]
    fn test_json_schema_export() {
        let schema = pet_schema().to_json_schema();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["petType"]));
        assert_eq!(schema["properties"]["petType"]["enum"], json!(["dog", "cat"]));
        assert_eq!(
            schema["properties"]["petType"]["description"],
            "The type of pet"
        );
        assert_eq!(schema["properties"]["count"]["type"], "integer");
        assert_eq!(schema["properties"]["count"]["maximum"], json!(20.0));
        assert_eq!(schema["properties"]["count"]["default"], json!(10));
        assert_eq!(schema["properties"]["names"]["items"]["minLength"], 1);
    }

    #[test]
    fn test_bounds_ignored_on_other_kinds() {
        assert_eq!(FieldKind::boolean().min(3.0), FieldKind::Boolean);
        assert_eq!(FieldKind::number().min_len(3), FieldKind::number());
    }

    #[test]
    fn test_default_implies_optional() {
        let field = Field::required("count", FieldKind::integer()).default_value(json!(10));
        assert!(field.optional);
    }

    #[test]
    fn test_lookup() {
        let schema = pet_schema();
        assert!(schema.contains("age"));
        assert!(!schema.contains("weight"));
        assert_eq!(schema.get("petType").map(|f| f.optional), Some(false));
    }
}
