pub mod error;

pub use error::{
    ErrorCategory, ErrorClassifier, InvocationFailure, InvocationFailureKind, LlmError,
    PetPalError, Result, ValidationError, ValidationErrorKind,
};

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Domain Types
// =============================================================================

/// Species supported by every advisory flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetType {
    Dog,
    Cat,
}

impl PetType {
    /// Wire values, in declaration order
    pub const ALL: [&'static str; 2] = ["dog", "cat"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PetType::Dog => "dog",
            PetType::Cat => "cat",
        }
    }
}

impl fmt::Display for PetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PetType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dog" => Ok(PetType::Dog),
            "cat" => Ok(PetType::Cat),
            _ => Err(format!("Unknown pet type: {}. Valid values: dog, cat", s)),
        }
    }
}

// =============================================================================
// Fallback Reasons
// =============================================================================

/// Why a flow returned its fixed fallback value instead of model output
///
/// The three invocation tags plus the two controller-level cases that never
/// reach (or never leave) the model: a rejected image and an empty name list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackReason {
    InvalidMedia,
    NoOutput,
    SchemaViolation,
    BackendError,
    EmptyResult,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMedia => "invalidMedia",
            Self::NoOutput => "noOutput",
            Self::SchemaViolation => "schemaViolation",
            Self::BackendError => "backendError",
            Self::EmptyResult => "emptyResult",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InvocationFailureKind> for FallbackReason {
    fn from(kind: InvocationFailureKind) -> Self {
        match kind {
            InvocationFailureKind::NoOutput => Self::NoOutput,
            InvocationFailureKind::SchemaViolation => Self::SchemaViolation,
            InvocationFailureKind::BackendError => Self::BackendError,
        }
    }
}

// =============================================================================
// Domain Newtypes
// =============================================================================

/// Type-safe wrapper for invocation IDs
///
/// Every flow call gets one; it is attached to log spans and to the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InvocationId(String);

impl InvocationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for InvocationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pet_type_parse_and_display() {
        assert_eq!("Dog".parse::<PetType>().unwrap(), PetType::Dog);
        assert_eq!("cat".parse::<PetType>().unwrap(), PetType::Cat);
        assert!("hamster".parse::<PetType>().is_err());
        assert_eq!(PetType::Cat.to_string(), "cat");
    }

    #[test]
    fn test_pet_type_serde_wire_format() {
        assert_eq!(serde_json::to_value(PetType::Dog).unwrap(), "dog");
        let parsed: PetType = serde_json::from_value(serde_json::json!("cat")).unwrap();
        assert_eq!(parsed, PetType::Cat);
    }

    #[test]
    fn test_fallback_reason_from_failure_kind() {
        assert_eq!(
            FallbackReason::from(InvocationFailureKind::SchemaViolation),
            FallbackReason::SchemaViolation
        );
        assert_eq!(
            serde_json::to_value(FallbackReason::InvalidMedia).unwrap(),
            "invalidMedia"
        );
        assert_eq!(FallbackReason::EmptyResult.to_string(), "emptyResult");
    }

    #[test]
    fn test_invocation_ids_are_unique() {
        assert_ne!(InvocationId::generate(), InvocationId::generate());
    }
}
