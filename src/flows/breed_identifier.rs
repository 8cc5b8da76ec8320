//! Breed Identifier
//!
//! Identifies a dog or cat breed from a photo. The photo must be an image
//! data URI; anything else is answered with a fixed error before any model
//! call is made.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::{FlowPipeline, FlowResult, FlowSpec, RetryPolicy, to_input};
use crate::ai::client::ModelClient;
use crate::ai::prompt::{MediaAttachment, PromptTemplate};
use crate::ai::schema::{Field, FieldKind, ObjectSchema};
use crate::constants::fallback;
use crate::types::{FallbackReason, InvocationFailure, Result};

pub const FLOW_NAME: &str = "breedIdentifier";

const PHOTO_FIELD: &str = "photoDataUri";

const SYSTEM: &str = "You are an expert pet breed identifier for dogs and cats.";

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreedRequest {
    /// `data:<mime>;base64,<data>`
    pub photo_data_uri: String,
}

impl std::fmt::Debug for BreedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreedRequest")
            .field(
                "photo_data_uri",
                &format_args!("[{} bytes]", self.photo_data_uri.len()),
            )
            .finish()
    }
}

/// Identification result; every field but `is_pet_detected` may be unknown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreedReport {
    pub is_pet_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperament: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_health_issues: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_lifespan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BreedReport {
    fn not_detected(error: &str) -> Self {
        Self {
            is_pet_detected: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Fallback for a failed invocation
pub fn fallback(failure: &InvocationFailure) -> BreedReport {
    match failure {
        InvocationFailure::NoOutput { .. } | InvocationFailure::SchemaViolation(_) => {
            BreedReport::not_detected(fallback::BREED_NO_OUTPUT)
        }
        InvocationFailure::BackendError(_) => BreedReport::not_detected(fallback::BREED_UNEXPECTED),
    }
}

/// Answer for a photo that is not an image data URI
pub fn invalid_image() -> BreedReport {
    BreedReport::not_detected(fallback::BREED_INVALID_IMAGE)
}

pub fn input_schema() -> ObjectSchema {
    ObjectSchema::new().field(
        Field::required(PHOTO_FIELD, FieldKind::string())
            .describe("Photo of a pet as a base64 data URI: data:<mimetype>;base64,<data>"),
    )
}

pub fn output_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field(
            Field::required("isPetDetected", FieldKind::boolean())
                .describe("Whether a dog or cat was detected in the image"),
        )
        .field(
            Field::optional("breedName", FieldKind::string())
                .describe("Most likely breed, or \"Unknown\" if unsure"),
        )
        .field(
            Field::optional("confidence", FieldKind::number().min(0.0).max(1.0))
                .describe("Confidence of the identification, 0.0 to 1.0"),
        )
        .field(Field::optional("temperament", FieldKind::string()))
        .field(Field::optional(
            "commonHealthIssues",
            FieldKind::array_of(FieldKind::string()),
        ))
        .field(
            Field::optional("averageLifespan", FieldKind::string())
                .describe("For example \"10-12 years\""),
        )
        .field(Field::optional("description", FieldKind::string()))
        .field(
            Field::optional("error", FieldKind::string())
                .describe("Why identification failed or no pet was found"),
        )
}

pub fn template() -> PromptTemplate {
    PromptTemplate::builder()
        .line("Analyze the provided image and identify the breed of the pet (dog or cat).")
        .line(
            "If no pet is clearly visible, set isPetDetected to false and explain why in 'error'.",
        )
        .line("If a pet is detected:")
        .numbered(&[
            "Set isPetDetected to true.",
            "Give the most likely breed in 'breedName'. If unsure, use \"Mixed Breed\" or \"Unknown Breed\".",
            "Give a 'confidence' between 0.0 and 1.0.",
            "Briefly describe the breed's typical 'temperament'.",
            "List a few 'commonHealthIssues' of the breed.",
            "State the breed's 'averageLifespan'.",
            "Add a short, interesting 'description' of the breed.",
        ])
        .newline()
        .text("Image to analyze: ")
        .media(PHOTO_FIELD)
        .newline()
        .newline()
        .line(
            "Prioritize accuracy. If the image is poor or the subject ambiguous, answer \"Unknown\" \
             with low confidence rather than guessing.",
        )
        .text("Focus on common dog and cat breeds.")
        .build()
}

pub fn spec() -> Result<FlowSpec> {
    Ok(FlowSpec::new(FLOW_NAME, input_schema(), output_schema(), template())?.with_system(SYSTEM))
}

#[derive(Debug, Clone)]
pub struct BreedIdentifier {
    pipeline: FlowPipeline,
}

impl BreedIdentifier {
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

    #[instrument(skip_all, fields(flow = FLOW_NAME))]
    pub async fn identify(&self, request: &BreedRequest) -> Result<FlowResult<BreedReport>> {
        self.identify_value(&to_input(request)?).await
    }

    pub async fn identify_value(&self, input: &Value) -> Result<FlowResult<BreedReport>> {
        let invocation_id = self.pipeline.begin();
        let validated = self.pipeline.validate_input(input)?;

        let uri = validated
            .get(PHOTO_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default();
        if MediaAttachment::parse_image(PHOTO_FIELD, uri).is_err() {
            return Ok(self.pipeline.degrade(
                invocation_id,
                invalid_image(),
                FallbackReason::InvalidMedia,
            ));
        }

        let outcome = self.pipeline.invoke_validated(&validated).await?;
        Ok(self.pipeline.settle(invocation_id, outcome, fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::metrics::create_shared_metrics;
    use crate::ai::prompt::MEDIA_PLACEHOLDER;
    use crate::ai::provider::ScriptedProvider;
    use crate::types::{ErrorCategory, LlmError, ValidationErrorKind};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    const PHOTO: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn identifier(provider: &Arc<ScriptedProvider>) -> BreedIdentifier {
        BreedIdentifier::new(ModelClient::from(provider.clone())).unwrap()
    }

    fn request(uri: &str) -> BreedRequest {
        BreedRequest {
            photo_data_uri: uri.to_string(),
        }
    }

    #[test]
    fn test_fallbacks_satisfy_output_schema() {
        let failures = [
            InvocationFailure::no_output("blank"),
            InvocationFailure::SchemaViolation(vec![]),
            InvocationFailure::BackendError(LlmError::new(ErrorCategory::Network, "down")),
        ];
        for failure in &failures {
            let value = serde_json::to_value(fallback(failure)).unwrap();
            assert!(output_schema().validate(&value).is_ok());
        }
        let value = serde_json::to_value(invalid_image()).unwrap();
        assert!(output_schema().validate(&value).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_uri_short_circuits_without_invocation() {
        let provider = Arc::new(ScriptedProvider::new());
        let metrics = create_shared_metrics();
        let identifier = BreedIdentifier::new(
            ModelClient::from(provider.clone()).with_metrics(metrics.clone()),
        )
        .unwrap();

        let result = identifier.identify(&request("not-a-data-uri")).await.unwrap();

        assert_eq!(result.fallback, Some(FallbackReason::InvalidMedia));
        assert!(!result.value.is_pet_detected);
        assert_eq!(result.value.error.as_deref(), Some(fallback::BREED_INVALID_IMAGE));
        assert_eq!(provider.call_count(), 0);
        assert_eq!(metrics.summary().model_calls, 0);
        assert_eq!(metrics.flow(FLOW_NAME).fallback_invalid_media, 1);
    }

    #[tokio::test]
    async fn test_missing_photo_is_an_input_error() {
        let provider = Arc::new(ScriptedProvider::new());
        let err = identifier(&provider).identify_value(&json!({})).await.unwrap_err();
        assert_eq!(
            err.violations()[0].kind,
            ValidationErrorKind::MissingRequiredField
        );
    }

    #[tokio::test]
    async fn test_photo_sent_as_attachment() {
        let provider = Arc::new(ScriptedProvider::new().then_output(json!({
            "isPetDetected": true,
            "breedName": "Siamese",
            "confidence": 0.92,
            "commonHealthIssues": ["Dental problems"],
            "averageLifespan": "15-20 years"
        })));

        let result = identifier(&provider).identify(&request(PHOTO)).await.unwrap();
        assert!(result.value.is_pet_detected);
        assert_eq!(result.value.breed_name.as_deref(), Some("Siamese"));
        assert!(result.value.temperament.is_none());

        let sent = &provider.requests()[0];
        assert_eq!(sent.attachments.len(), 1);
        assert_eq!(sent.attachments[0].mime_type, "image/png");
        assert!(sent.prompt_text().contains(MEDIA_PLACEHOLDER));
        assert!(!sent.prompt_text().contains("base64"));
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_falls_back() {
        let provider = Arc::new(
            ScriptedProvider::new().then_output(json!({"isPetDetected": true, "confidence": 1.7})),
        );
        let result = identifier(&provider).identify(&request(PHOTO)).await.unwrap();

        assert_eq!(result.fallback, Some(FallbackReason::SchemaViolation));
        assert_eq!(result.value.error.as_deref(), Some(fallback::BREED_NO_OUTPUT));
    }

    #[tokio::test]
    async fn test_backend_error_uses_unexpected_message() {
        let provider = Arc::new(
            ScriptedProvider::new().then_error(LlmError::new(ErrorCategory::Auth, "bad key")),
        );
        let result = identifier(&provider).identify(&request(PHOTO)).await.unwrap();

        assert_eq!(result.fallback, Some(FallbackReason::BackendError));
        assert_eq!(result.value.error.as_deref(), Some(fallback::BREED_UNEXPECTED));
    }

    #[test]
    fn test_request_debug_hides_payload() {
        let debug = format!("{:?}", request(PHOTO));
        assert!(!debug.contains("iVBOR"));
    }

    proptest! {
        #[test]
        fn prop_confidence_bound(confidence in -2.0f64..3.0) {
            let candidate = json!({"isPetDetected": true, "confidence": confidence});
            let accepted = output_schema().validate(&candidate).is_ok();
            prop_assert_eq!(accepted, (0.0..=1.0).contains(&confidence));
        }
    }
}
