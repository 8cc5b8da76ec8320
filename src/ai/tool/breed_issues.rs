//! Breed health-issue lookup tool
//!
//! Small static knowledge base of common predispositions. Lookup is a
//! case-insensitive substring match against the supplied breed name; the
//! first matching entry wins.

use serde_json::{Value, json};

use super::{ToolDeclaration, ToolHandler, ToolRegistry};
use crate::ai::schema::{Field, FieldKind, ObjectSchema};
use crate::types::Result;

pub const TOOL_NAME: &str = "getBreedSpecificIssues";

const DESCRIPTION: &str = "Fetches common health issues or predispositions for a specific pet breed \
from the PetPal knowledge base. Use this if a breed is provided to get more targeted information.";

const KNOWN_ISSUES: &[(&str, [&str; 4])] = &[
    (
        "labrador",
        [
            "Prone to hip and elbow dysplasia",
            "Higher risk of obesity",
            "Potential for certain eye conditions like PRA",
            "Ear infections due to floppy ears",
        ],
    ),
    (
        "siamese",
        [
            "Dental problems are common",
            "May be prone to asthma or other respiratory issues",
            "Progressive retinal atrophy (PRA) risk",
            "Sensitive stomachs reported by some owners",
        ],
    ),
    (
        "german shepherd",
        [
            "Hip and elbow dysplasia",
            "Degenerative myelopathy",
            "Bloat (Gastric Dilatation-Volvulus)",
            "Exocrine pancreatic insufficiency (EPI)",
        ],
    ),
    (
        "poodle",
        [
            "Addison's disease",
            "Bloat (Gastric Dilatation-Volvulus)",
            "Thyroid issues (hypothyroidism)",
            "Progressive retinal atrophy (PRA)",
        ],
    ),
];

/// Common issues for `breed`, or a single explanatory message when unknown
pub fn lookup(breed: &str) -> Vec<String> {
    let needle = breed.to_lowercase();
    KNOWN_ISSUES
        .iter()
        .find(|(key, _)| needle.contains(key))
        .map(|(_, issues)| issues.iter().map(|s| s.to_string()).collect())
        .unwrap_or_else(|| {
            vec![format!(
                "No specific common issues pre-loaded in the simplified knowledge base for '{}'. \
                 General advice will be provided.",
                breed
            )]
        })
}

pub fn declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        TOOL_NAME,
        DESCRIPTION,
        ObjectSchema::new().field(
            Field::required("breed", FieldKind::string())
                .describe("The breed of the pet to fetch common issues for."),
        ),
        ObjectSchema::new().field(
            Field::required("issues", FieldKind::array_of(FieldKind::string())).describe(
                "A list of common health issues or predispositions for the specified breed.",
            ),
        ),
    )
}

/// Handler over the static table
#[derive(Debug, Clone, Copy, Default)]
pub struct BreedIssuesTool;

impl ToolHandler for BreedIssuesTool {
    fn call(&self, input: &Value) -> std::result::Result<Value, String> {
        let breed = input
            .get("breed")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing 'breed' argument".to_string())?;
        Ok(json!({ "issues": lookup(breed) }))
    }
}

/// Add the tool to a registry
pub fn register(registry: ToolRegistry) -> Result<ToolRegistry> {
    registry.register(declaration(), BreedIssuesTool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_case_insensitive_match() {
        let issues = lookup("Labrador Retriever");
        assert_eq!(issues.len(), 4);
        assert_eq!(issues[0], "Prone to hip and elbow dysplasia");

        assert_eq!(lookup("MINIATURE POODLE")[0], "Addison's disease");
        assert_eq!(lookup("white german shepherd")[1], "Degenerative myelopathy");
    }

    #[test]
    fn test_unknown_breed_returns_default_message() {
        let issues = lookup("Unknown Xyz");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("'Unknown Xyz'"));
        assert!(issues[0].contains("General advice will be provided."));
    }

    #[test]
    fn test_dispatch_through_registry() {
        let registry = register(ToolRegistry::new()).unwrap();
        let output = registry
            .dispatch(TOOL_NAME, &json!({"breed": "siamese"}))
            .unwrap();
        assert_eq!(output["issues"][0], "Dental problems are common");

        assert!(registry.dispatch(TOOL_NAME, &json!({})).is_err());
    }
}
