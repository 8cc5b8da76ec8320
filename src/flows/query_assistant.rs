//! Query Assistant
//!
//! Free-form pet-care questions. Whether an answer needs a "consult your
//! vet" disclaimer is left to the model, guided by the policy in the prompt;
//! failures fall back toward caution with `disclaimer_needed = true`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::{FlowPipeline, FlowResult, FlowSpec, RetryPolicy, to_input};
use crate::ai::client::ModelClient;
use crate::ai::prompt::PromptTemplate;
use crate::ai::schema::{Field, FieldKind, ObjectSchema};
use crate::constants::{fallback, query};
use crate::types::{InvocationFailure, Result};

pub const FLOW_NAME: &str = "queryAssistant";

const SYSTEM: &str = "You are Pal, a friendly and knowledgeable AI assistant for pet owners.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnswer {
    pub answer: String,
    pub disclaimer_needed: bool,
}

pub fn fallback(failure: &InvocationFailure) -> QueryAnswer {
    let answer = match failure {
        InvocationFailure::NoOutput { .. } | InvocationFailure::SchemaViolation(_) => {
            fallback::QUERY_NO_OUTPUT
        }
        InvocationFailure::BackendError(_) => fallback::QUERY_UNEXPECTED,
    };
    QueryAnswer {
        answer: answer.to_string(),
        disclaimer_needed: true,
    }
}

pub fn input_schema() -> ObjectSchema {
    ObjectSchema::new().field(
        Field::required("query", FieldKind::string().min_len(query::MIN_QUERY_LEN))
            .describe("The user's question about pet care, behavior, health or general knowledge"),
    )
}

pub fn output_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field(
            Field::required("answer", FieldKind::string())
                .describe("Helpful and informative answer to the question"),
        )
        .field(
            Field::required("disclaimerNeeded", FieldKind::boolean())
                .describe("Whether the answer should carry a consult-a-veterinarian disclaimer"),
        )
}

pub fn template() -> PromptTemplate {
    PromptTemplate::builder()
        .line("Answer the pet owner's question clearly and accurately.")
        .newline()
        .text("User's query: ")
        .field("query")
        .newline()
        .newline()
        .line("Set disclaimerNeeded:")
        .line(
            "- true when the answer touches health, symptoms, medication, feeding changes, \
             behavior interventions or anything else the owner might act on for the pet's well-being.",
        )
        .line("- false for general knowledge such as typical lifespan, breed history or name ideas.")
        .newline()
        .line("Guidelines:")
        .numbered(&[
            "Keep answers concise and easy to understand.",
            "For anything that sounds like an emergency, tell the owner to contact a veterinarian immediately.",
            "Do not diagnose. Describe possibilities and recommend a professional examination.",
            "Only answer questions about pets. For unrelated questions, politely say you can only help \
             with pet topics and set disclaimerNeeded to false.",
        ])
        .build()
}

pub fn spec() -> Result<FlowSpec> {
    Ok(FlowSpec::new(FLOW_NAME, input_schema(), output_schema(), template())?.with_system(SYSTEM))
}

#[derive(Debug, Clone)]
pub struct QueryAssistant {
    pipeline: FlowPipeline,
}

impl QueryAssistant {
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
    pub async fn ask(&self, request: &QueryRequest) -> Result<FlowResult<QueryAnswer>> {
        self.ask_value(&to_input(request)?).await
    }

    pub async fn ask_value(&self, input: &Value) -> Result<FlowResult<QueryAnswer>> {
        self.pipeline.run(input, fallback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::ScriptedProvider;
    use crate::types::{ErrorCategory, FallbackReason, LlmError, ValidationErrorKind};
    use serde_json::json;
    use std::sync::Arc;

    fn assistant(provider: &Arc<ScriptedProvider>) -> QueryAssistant {
        QueryAssistant::new(ModelClient::from(provider.clone())).unwrap()
    }

    fn ask(query: &str) -> QueryRequest {
        QueryRequest {
            query: query.to_string(),
        }
    }

    #[test]
    fn test_fallbacks_satisfy_output_schema_and_request_disclaimer() {
        let failures = [
            InvocationFailure::no_output("blank"),
            InvocationFailure::BackendError(LlmError::new(ErrorCategory::Network, "down")),
        ];
        for failure in &failures {
            let answer = fallback(failure);
            assert!(answer.disclaimer_needed);
            let value = serde_json::to_value(&answer).unwrap();
            assert!(output_schema().validate(&value).is_ok());
        }
        assert_ne!(fallback(&failures[0]).answer, fallback(&failures[1]).answer);
    }

    #[test]
    fn test_prompt_carries_disclaimer_policy() {
        let rendered = template()
            .render(&json!({"query": "What vaccines does my puppy need?"}))
            .unwrap();
        assert!(rendered.text.contains("User's query: What vaccines does my puppy need?"));
        assert!(rendered.text.contains("- true when the answer touches health"));
        assert!(rendered.text.contains("name ideas"));
    }

    #[tokio::test]
    async fn test_health_question_keeps_model_disclaimer() {
        let provider = Arc::new(ScriptedProvider::new().then_output(json!({
            "answer": "Core vaccines include distemper, parvovirus and rabies.",
            "disclaimerNeeded": true
        })));
        let result = assistant(&provider)
            .ask(&ask("What vaccines does my puppy need?"))
            .await
            .unwrap();
        assert!(result.value.disclaimer_needed);
        assert!(!result.is_fallback());
    }

    #[tokio::test]
    async fn test_trivia_answer_is_not_second_guessed() {
        let provider = Arc::new(ScriptedProvider::new().then_output(json!({
            "answer": "Shadow, Onyx or Salem are popular choices.",
            "disclaimerNeeded": false
        })));
        let result = assistant(&provider)
            .ask(&ask("What's a good name for a black cat?"))
            .await
            .unwrap();
        assert!(!result.value.disclaimer_needed);
    }

    #[tokio::test]
    async fn test_short_query_rejected() {
        let provider = Arc::new(ScriptedProvider::new());
        let err = assistant(&provider).ask(&ask("hi")).await.unwrap_err();
        assert_eq!(err.violations()[0].kind, ValidationErrorKind::OutOfRange);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_disclaimer_falls_back_to_caution() {
        let provider =
            Arc::new(ScriptedProvider::new().then_output(json!({"answer": "Twice a day."})));
        let result = assistant(&provider)
            .ask(&ask("How often should I feed my kitten?"))
            .await
            .unwrap();

        assert_eq!(result.fallback, Some(FallbackReason::SchemaViolation));
        assert_eq!(result.value.answer, fallback::QUERY_NO_OUTPUT);
        assert!(result.value.disclaimer_needed);
    }

    #[tokio::test]
    async fn test_backend_error_message() {
        let provider = Arc::new(
            ScriptedProvider::new().then_error(LlmError::new(ErrorCategory::Unknown, "boom")),
        );
        let result = assistant(&provider)
            .ask(&ask("Can dogs eat grapes?"))
            .await
            .unwrap();
        assert_eq!(result.value.answer, fallback::QUERY_UNEXPECTED);
    }
}
