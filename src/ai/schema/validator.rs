//! Generic schema validator
//!
//! Walks an [`ObjectSchema`] and a JSON value together, collecting every
//! violation instead of stopping at the first one. On success the returned
//! value is normalized: numeric strings are coerced, defaults are filled in,
//! and undeclared fields are dropped.

use serde_json::{Map, Number, Value};

use super::{Field, FieldKind, ObjectSchema};
use crate::types::{ValidationError, ValidationErrorKind};

/// Validate `value` against `schema`
///
/// Side-effect free; the violation list is complete for the given input.
pub fn validate(schema: &ObjectSchema, value: &Value) -> Result<Value, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let normalized = validate_object(schema, value, "", &mut errors);

    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(errors)
    }
}

fn validate_object(
    schema: &ObjectSchema,
    value: &Value,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> Value {
    let Some(map) = value.as_object() else {
        errors.push(type_mismatch(path, "object", value));
        return Value::Null;
    };

    let mut out = Map::new();

    for field in schema.fields() {
        let field_path = join_path(path, &field.name);

        match map.get(&field.name) {
            Some(present) if !is_absent(field, present) => {
                if let Some(normalized) = validate_kind(&field.kind, present, &field_path, errors)
                {
                    out.insert(field.name.clone(), normalized);
                }
            }
            _ => {
                if let Some(default) = &field.default {
                    out.insert(field.name.clone(), default.clone());
                } else if !field.optional {
                    errors.push(
                        ValidationError::new(
                            ValidationErrorKind::MissingRequiredField,
                            format!("required {} field is missing", field.kind.type_name()),
                        )
                        .with_field(field_path),
                    );
                }
            }
        }
    }

    Value::Object(out)
}

/// `null` counts as absent; so does a blank string for an optional number,
/// which is what an untouched form input submits.
fn is_absent(field: &Field, value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            field.optional && matches!(field.kind, FieldKind::Number { .. }) && s.trim().is_empty()
        }
        _ => false,
    }
}

fn validate_kind(
    kind: &FieldKind,
    value: &Value,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<Value> {
    match kind {
        FieldKind::String { min_len, max_len } => {
            let Some(s) = value.as_str() else {
                errors.push(type_mismatch(path, "string", value));
                return None;
            };
            let len = s.chars().count();
            if let Some(min) = min_len
                && len < *min
            {
                errors.push(out_of_range(
                    path,
                    format!("length >= {}", min),
                    format!("length {}", len),
                ));
                return None;
            }
            if let Some(max) = max_len
                && len > *max
            {
                errors.push(out_of_range(
                    path,
                    format!("length <= {}", max),
                    format!("length {}", len),
                ));
                return None;
            }
            Some(value.clone())
        }

        FieldKind::Number { min, max, integer } => {
            let Some(number) = coerce_number(value) else {
                errors.push(type_mismatch(path, kind.type_name(), value));
                return None;
            };
            if *integer && number.fract() != 0.0 {
                errors.push(type_mismatch(path, "integer", value));
                return None;
            }
            if let Some(min) = min
                && number < *min
            {
                errors.push(out_of_range(
                    path,
                    format!(">= {}", min),
                    number.to_string(),
                ));
                return None;
            }
            if let Some(max) = max
                && number > *max
            {
                errors.push(out_of_range(
                    path,
                    format!("<= {}", max),
                    number.to_string(),
                ));
                return None;
            }
            Some(normalize_number(value, number, *integer))
        }

        FieldKind::Boolean => {
            if value.is_boolean() {
                Some(value.clone())
            } else {
                errors.push(type_mismatch(path, "boolean", value));
                None
            }
        }

        FieldKind::Enum(allowed) => {
            let Some(s) = value.as_str() else {
                errors.push(type_mismatch(path, "string", value));
                return None;
            };
            if allowed.iter().any(|a| a == s) {
                Some(value.clone())
            } else {
                errors.push(
                    ValidationError::new(
                        ValidationErrorKind::InvalidEnumValue,
                        format!("'{}' is not one of the allowed values", s),
                    )
                    .with_field(path)
                    .with_comparison(allowed.join(" | "), s),
                );
                None
            }
        }

        FieldKind::Array(item) => {
            let Some(items) = value.as_array() else {
                errors.push(type_mismatch(path, "array", value));
                return None;
            };
            let before = errors.len();
            let normalized: Vec<Value> = items
                .iter()
                .enumerate()
                .filter_map(|(idx, v)| validate_kind(item, v, &format!("{}[{}]", path, idx), errors))
                .collect();
            (errors.len() == before).then_some(Value::Array(normalized))
        }

        FieldKind::Object(schema) => {
            let before = errors.len();
            let normalized = validate_object(schema, value, path, errors);
            (errors.len() == before).then_some(normalized)
        }
    }
}

/// Numbers pass through; numeric strings (form input) are parsed
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn normalize_number(original: &Value, number: f64, integer: bool) -> Value {
    if integer {
        return Value::from(number as i64);
    }
    match original {
        Value::Number(_) => original.clone(),
        _ if number.fract() == 0.0 && number.abs() < 1e15 => Value::from(number as i64),
        _ => Number::from_f64(number).map_or(Value::Null, Value::Number),
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_mismatch(path: &str, expected: &str, actual: &Value) -> ValidationError {
    let err = ValidationError::new(
        ValidationErrorKind::TypeMismatch,
        format!("expected {}, got {}", expected, json_type_name(actual)),
    )
    .with_comparison(expected, json_type_name(actual));

    if path.is_empty() {
        err
    } else {
        err.with_field(path)
    }
}

fn out_of_range(path: &str, expected: String, actual: String) -> ValidationError {
    ValidationError::new(
        ValidationErrorKind::OutOfRange,
        format!("value out of range (expected {}, got {})", expected, actual),
    )
    .with_field(path)
    .with_comparison(expected, actual)
}
