//! Tool Registry
//!
//! Tools are side-functions a model may call mid-generation. Each tool has a
//! declaration (name, description, input/output schemas) shown to the backend
//! and a handler executed by the invocation client.
//!
//! Dispatch never fails the invocation: unknown names, invalid arguments,
//! handler errors and handler panics all come back as [`ToolError`] values
//! that the client reports to the model as tool-error results.

pub mod breed_issues;

use serde_json::Value;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ai::provider::ToolDefinition;
use crate::ai::schema::ObjectSchema;
use crate::types::{PetPalError, Result, ValidationError, ValidationErrorKind};

// =============================================================================
// Declarations & Handlers
// =============================================================================

/// Metadata describing a tool to the backend model
#[derive(Debug, Clone)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: ObjectSchema,
    pub output_schema: ObjectSchema,
}

impl ToolDeclaration {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: ObjectSchema,
        output_schema: ObjectSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            output_schema,
        }
    }

    /// Backend-facing form with the input schema as JSON Schema
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.to_json_schema(),
        }
    }
}

/// Tool implementation
///
/// Handlers receive arguments already validated against the input schema
/// and must be deterministic over that input.
pub trait ToolHandler: Send + Sync {
    fn call(&self, input: &Value) -> std::result::Result<Value, String>;
}

impl<F> ToolHandler for F
where
    F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync,
{
    fn call(&self, input: &Value) -> std::result::Result<Value, String> {
        self(input)
    }
}

/// Why a tool call produced no usable output
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("{0}")]
    InvalidInput(ValidationError),

    #[error("{0}")]
    InvalidOutput(ValidationError),

    #[error("tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },

    #[error("tool '{tool}' panicked: {message}")]
    Panicked { tool: String, message: String },
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Clone)]
struct RegisteredTool {
    declaration: ToolDeclaration,
    handler: Arc<dyn ToolHandler>,
}

/// Named set of tools available to one flow
///
/// Read-only after construction; cloning shares the handlers.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; names must be unique within the registry
    pub fn register(
        mut self,
        declaration: ToolDeclaration,
        handler: impl ToolHandler + 'static,
    ) -> Result<Self> {
        if self.index.contains_key(&declaration.name) {
            return Err(PetPalError::Config(format!(
                "Tool '{}' is already registered",
                declaration.name
            )));
        }
        self.index
            .insert(declaration.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            declaration,
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .map(|t| t.declaration.name.as_str())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDeclaration> {
        self.index.get(name).map(|&i| &self.tools[i].declaration)
    }

    /// Declarations in the form sent to backends
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| t.declaration.to_definition())
            .collect()
    }

    /// Validate arguments, run the handler and validate its output
    pub fn dispatch(&self, name: &str, arguments: &Value) -> std::result::Result<Value, ToolError> {
        let tool = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let input = tool
            .declaration
            .input_schema
            .validate(arguments)
            .map_err(|errors| {
                ToolError::InvalidInput(summarize(
                    ValidationErrorKind::ToolInputInvalid,
                    name,
                    &errors,
                ))
            })?;

        debug!(tool = name, "Executing tool");

        let outcome = catch_unwind(AssertUnwindSafe(|| tool.handler.call(&input)));
        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(message)) => {
                warn!(tool = name, error = %message, "Tool returned an error");
                return Err(ToolError::Failed {
                    tool: name.to_string(),
                    message,
                });
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(tool = name, error = %message, "Tool panicked");
                return Err(ToolError::Panicked {
                    tool: name.to_string(),
                    message,
                });
            }
        };

        tool.declaration
            .output_schema
            .validate(&output)
            .map_err(|errors| {
                warn!(tool = name, violations = errors.len(), "Tool output rejected");
                ToolError::InvalidOutput(summarize(
                    ValidationErrorKind::ToolOutputInvalid,
                    name,
                    &errors,
                ))
            })
    }
}

/// Fold a set of schema violations into one tool-level error
fn summarize(kind: ValidationErrorKind, tool: &str, errors: &[ValidationError]) -> ValidationError {
    let details = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    ValidationError::new(kind, details).with_field(tool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::schema::{Field, FieldKind};
    use serde_json::json;

    fn echo_declaration(name: &str) -> ToolDeclaration {
        ToolDeclaration::new(
            name,
            "Echo the word back",
            ObjectSchema::new().field(Field::required("word", FieldKind::string())),
            ObjectSchema::new().field(Field::required("echo", FieldKind::string())),
        )
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .register(echo_declaration("echo"), |input: &Value| {
                Ok(json!({"echo": input["word"]}))
            })
            .unwrap()
            .register(echo_declaration("broken"), |_: &Value| Ok(json!({"echo": 42})))
            .unwrap()
            .register(echo_declaration("failing"), |_: &Value| {
                Err("knowledge base offline".to_string())
            })
            .unwrap()
            .register(echo_declaration("panicking"), |_: &Value| -> std::result::Result<Value, String> {
                panic!("lookup table corrupted")
            })
            .unwrap()
    }

    #[test]
    fn test_dispatch_success() {
        let output = registry().dispatch("echo", &json!({"word": "woof"})).unwrap();
        assert_eq!(output, json!({"echo": "woof"}));
    }

    #[test]
    fn test_unknown_tool() {
        let err = registry().dispatch("missing", &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref n) if n == "missing"));
    }

    #[test]
    fn test_invalid_input() {
        let err = registry().dispatch("echo", &json!({"word": 7})).unwrap_err();
        match err {
            ToolError::InvalidInput(v) => {
                assert_eq!(v.kind, ValidationErrorKind::ToolInputInvalid);
                assert_eq!(v.field_name(), "echo");
                assert!(v.message.contains("word"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_output() {
        let err = registry().dispatch("broken", &json!({"word": "x"})).unwrap_err();
        assert!(
            matches!(err, ToolError::InvalidOutput(ref v) if v.kind == ValidationErrorKind::ToolOutputInvalid)
        );
    }

    #[test]
    fn test_handler_error_and_panic_are_captured() {
        let registry = registry();

        let err = registry.dispatch("failing", &json!({"word": "x"})).unwrap_err();
        assert!(err.to_string().contains("knowledge base offline"));

        let err = registry.dispatch("panicking", &json!({"word": "x"})).unwrap_err();
        assert!(matches!(err, ToolError::Panicked { .. }));
        assert!(err.to_string().contains("lookup table corrupted"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ToolRegistry::new()
            .register(echo_declaration("echo"), |_: &Value| Ok(json!({"echo": ""})))
            .unwrap()
            .register(echo_declaration("echo"), |_: &Value| Ok(json!({"echo": ""})));
        assert!(matches!(result, Err(PetPalError::Config(_))));
    }

    #[test]
    fn test_definitions_export_input_schema() {
        let defs = registry().definitions();
        assert_eq!(defs.len(), 4);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["required"], json!(["word"]));
    }
}
