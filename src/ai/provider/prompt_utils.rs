//! Prompt building utilities shared by the HTTP backends.

use serde_json::Value;

const DEFAULT_SYSTEM: &str = "You are a knowledgeable pet-care assistant.";

/// System message carrying the persona and the output schema contract.
///
/// Returns just the persona when the schema is null.
pub fn build_system_prompt(system: Option<&str>, schema: &Value) -> String {
    let persona = system.unwrap_or(DEFAULT_SYSTEM);
    if schema.is_null() {
        return persona.to_string();
    }

    let schema_str = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "{}\n\nWhen you give your final answer, respond with valid JSON matching this schema:\n```json\n{}\n```\n\nRespond ONLY with the JSON object, no explanation. \
         If you need information from a tool, call the tool instead of answering.",
        persona, schema_str
    )
}

/// Tool results travel as JSON text on chat backends
pub fn tool_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_schema_keeps_persona() {
        assert_eq!(build_system_prompt(None, &Value::Null), DEFAULT_SYSTEM);
        assert_eq!(build_system_prompt(Some("Vet"), &Value::Null), "Vet");
    }

    #[test]
    fn test_schema_is_embedded() {
        let schema = json!({"type": "object", "properties": {"answer": {"type": "string"}}});
        let result = build_system_prompt(Some("You are a vet."), &schema);

        assert!(result.starts_with("You are a vet."));
        assert!(result.contains("\"answer\""));
        assert!(result.contains("JSON"));
    }

    #[test]
    fn test_tool_content() {
        assert_eq!(tool_content(&json!({"issues": []})), r#"{"issues":[]}"#);
        assert_eq!(tool_content(&json!("plain")), "plain");
    }
}
