//! Symptom Checker
//!
//! Possible causes and next steps for a described set of symptoms. When a
//! breed is given the model is pointed at the breed health-issue tool.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::{FlowPipeline, FlowResult, FlowSpec, RetryPolicy, to_input};
use crate::ai::client::ModelClient;
use crate::ai::prompt::PromptTemplate;
use crate::ai::schema::{Field, FieldKind, ObjectSchema};
use crate::ai::tool::{ToolRegistry, breed_issues};
use crate::constants::fallback;
use crate::types::{PetType, Result, ValidationError, ValidationErrorKind};

pub const FLOW_NAME: &str = "symptomChecker";

const SYSTEM: &str = "You are an expert veterinary assistant. You help pet owners understand \
what their pet's symptoms may indicate. You never replace a veterinary examination.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomRequest {
    pub symptoms: String,
    pub pet_type: PetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    /// Age in years
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
}

impl SymptomRequest {
    /// NaN and infinite ages serialize as `null` and would read as absent
    fn non_finite_violations(&self) -> Vec<ValidationError> {
        match self.age {
            Some(age) if !age.is_finite() => vec![
                ValidationError::new(
                    ValidationErrorKind::TypeMismatch,
                    "age must be a finite number",
                )
                .with_field("age")
                .with_comparison("number", age.to_string()),
            ],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomReport {
    pub potential_causes: String,
    pub recommendations: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Returned whenever the model produced nothing usable
pub fn fallback() -> SymptomReport {
    SymptomReport {
        potential_causes: fallback::SYMPTOM_CAUSES.to_string(),
        recommendations: fallback::SYMPTOM_RECOMMENDATIONS.to_string(),
        warning: Some(fallback::SYMPTOM_WARNING.to_string()),
    }
}

pub fn input_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field(
            Field::required("symptoms", FieldKind::string())
                .describe("Description of the symptoms the pet is experiencing"),
        )
        .field(Field::required(
            "petType",
            FieldKind::enumeration(PetType::ALL),
        ))
        .field(Field::optional("breed", FieldKind::string()).describe("Breed of the pet"))
        .field(Field::optional("age", FieldKind::number().min(0.0)).describe("Age in years"))
}

pub fn output_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field(
            Field::required("potentialCauses", FieldKind::string())
                .describe("Possible causes of the symptoms"),
        )
        .field(
            Field::required("recommendations", FieldKind::string())
                .describe("What the owner should do next"),
        )
        .field(
            Field::optional("warning", FieldKind::string())
                .describe("Present when the symptoms may be serious"),
        )
}

pub fn template() -> PromptTemplate {
    PromptTemplate::builder()
        .text("Given the following information for a ")
        .field("petType")
        .when_present("breed", |b| b.text(", of breed '").field("breed").text("'"))
        .when_present("age", |b| b.text(", age ").field("age").text(" year(s) old"))
        .line(" pet:")
        .text("Symptoms: ")
        .field("symptoms")
        .newline()
        .newline()
        .when_present("breed", |b| {
            b.text("A breed was provided. Consider calling the ")
                .text(breed_issues::TOOL_NAME)
                .line(" tool to look up health issues common to this breed.")
                .line(
                    "If you use what the tool returns, say clearly in your answer that \
                     breed-specific information informed it.",
                )
                .newline()
        })
        .line("Provide:")
        .numbered(&[
            "Potential Causes: the most likely explanations for these symptoms.",
            "Recommendations: practical next steps for the owner, including when to see a vet.",
            "Warning: only if the symptoms could be serious, a clear warning to seek veterinary attention.",
        ])
        .newline()
        .text("Be empathetic and clear. The owner may be worried about their pet.")
        .build()
}

pub fn spec() -> Result<FlowSpec> {
    Ok(
        FlowSpec::new(FLOW_NAME, input_schema(), output_schema(), template())?
            .with_system(SYSTEM)
            .with_tools(breed_issues::register(ToolRegistry::new())?),
    )
}

#[derive(Debug, Clone)]
pub struct SymptomChecker {
    pipeline: FlowPipeline,
}

impl SymptomChecker {
    pub fn new(client: ModelClient) -> Result<Self> {
        Ok(Self {
            pipeline: FlowPipeline::new(spec()?, client),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.pipeline = self.pipeline.with_retry(retry);
        self
    }

    pub fn spec(&self) -> &FlowSpec {
        self.pipeline.spec()
    }

    #[instrument(skip_all, fields(flow = FLOW_NAME, pet_type = %request.pet_type))]
    pub async fn check(&self, request: &SymptomRequest) -> Result<FlowResult<SymptomReport>> {
        let input = to_input(request)?;
        let mut violations = request.non_finite_violations();
        if !violations.is_empty() {
            if let Err(others) = self.pipeline.spec().input_schema.validate(&input) {
                violations.extend(others);
            }
            return Err(self.pipeline.reject(violations));
        }
        self.check_value(&input).await
    }

    /// Raw entry for form-style input; numeric strings are coerced
    pub async fn check_value(&self, input: &Value) -> Result<FlowResult<SymptomReport>> {
        self.pipeline.run(input, |_| fallback()).await
    }
}
