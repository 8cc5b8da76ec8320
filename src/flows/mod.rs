//! Flow Controllers
//!
//! Each advisory feature is a [`FlowSpec`] (schemas, template, tools) driven
//! by a shared [`FlowPipeline`]:
//!
//! ```text
//! Received ─► InputValidated ─► PromptRendered ─► ModelInvoked ─► OutputValidated ─► Returned
//!    │              │                 │                 │
//!    └─ Err(InvalidInput) ◄───────────┘                 └─► FallbackReturned
//! ```
//!
//! Input problems are the caller's to fix and come back as
//! `Err(PetPalError::InvalidInput)`. Everything that goes wrong after the
//! prompt is rendered becomes a schema-valid fallback value tagged with a
//! [`FallbackReason`].

pub mod breed_identifier;
pub mod name_generator;
pub mod query_assistant;
pub mod symptom_checker;

pub use breed_identifier::{BreedIdentifier, BreedReport, BreedRequest};
pub use name_generator::{NameGenerator, NameList, NameRequest};
pub use query_assistant::{QueryAnswer, QueryAssistant, QueryRequest};
pub use symptom_checker::{SymptomChecker, SymptomReport, SymptomRequest};

use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ai::client::{InvocationRequest, ModelClient};
use crate::ai::metrics::SharedMetrics;
use crate::ai::prompt::{PromptTemplate, RenderedPrompt};
use crate::ai::provider::{SharedProvider, create_provider};
use crate::ai::schema::ObjectSchema;
use crate::ai::tool::ToolRegistry;
use crate::config::{Config, FlowsConfig};
use crate::constants::retry;
use crate::types::{
    FallbackReason, InvocationFailure, InvocationId, PetPalError, Result, ValidationError,
    ValidationErrorKind,
};

/// Outcome of the model stage: typed output or the reason it failed
pub type Outcome<T> = std::result::Result<T, InvocationFailure>;

// =============================================================================
// Flow Result
// =============================================================================

/// Value returned by every flow call
///
/// `value` always satisfies the flow's output schema, whether it came from
/// the model or from the fixed fallback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResult<T> {
    pub value: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
    pub invocation_id: InvocationId,
}

impl<T> FlowResult<T> {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

// =============================================================================
// Flow Spec
// =============================================================================

/// Static description of one flow, read-only after construction
#[derive(Debug, Clone)]
pub struct FlowSpec {
    pub name: &'static str,
    pub system: Option<String>,
    pub input_schema: ObjectSchema,
    pub output_schema: ObjectSchema,
    pub template: PromptTemplate,
    pub tools: ToolRegistry,
}

impl FlowSpec {
    /// Fails with `Config` when the template reads undeclared input fields
    /// or holds more than one media reference.
    pub fn new(
        name: &'static str,
        input_schema: ObjectSchema,
        output_schema: ObjectSchema,
        template: PromptTemplate,
    ) -> Result<Self> {
        let problems = template.check_against(&input_schema);
        if !problems.is_empty() {
            return Err(PetPalError::Config(format!(
                "flow '{}': {}",
                name,
                problems.join("; ")
            )));
        }

        Ok(Self {
            name,
            system: None,
            input_schema,
            output_schema,
            template,
            tools: ToolRegistry::new(),
        })
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Flow-level retry for transient backend errors
///
/// Only `BackendError`s with a retryable category are retried; a missing or
/// invalid candidate is final.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(retry::BASE_DELAY_MS),
            max_delay: Duration::from_secs(retry::MAX_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FlowsConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            ..Self::default()
        }
    }

    pub fn should_retry(&self, attempt: u32, failure: &InvocationFailure) -> bool {
        attempt < self.max_attempts && failure.is_retryable()
    }

    /// Wait before attempt `attempt + 1`
    ///
    /// A backend-supplied `retry_after` wins; otherwise exponential backoff
    /// from `base_delay` plus up to a quarter of jitter, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, failure: &InvocationFailure) -> Duration {
        if let InvocationFailure::BackendError(e) = failure
            && let Some(after) = e.retry_after
        {
            return after.min(self.max_delay);
        }

        let mut delay = self.base_delay.min(self.max_delay);
        for _ in 1..attempt {
            delay = calculate_backoff(delay, retry::BACKOFF_FACTOR, self.max_delay);
        }
        (delay + random_jitter(delay)).min(self.max_delay)
    }
}

fn random_jitter(base_delay: Duration) -> Duration {
    let max_jitter_ms = (base_delay.as_millis() as u64) / 4;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_jitter_ms))
}

fn calculate_backoff(current: Duration, factor: f32, max: Duration) -> Duration {
    let next = Duration::from_secs_f32(current.as_secs_f32() * factor);
    std::cmp::min(next, max)
}

// =============================================================================
// Pipeline
// =============================================================================

/// Generic flow driver shared by the four controllers
#[derive(Debug, Clone)]
pub struct FlowPipeline {
    spec: FlowSpec,
    client: ModelClient,
    retry: RetryPolicy,
}

impl FlowPipeline {
    pub fn new(spec: FlowSpec, client: ModelClient) -> Self {
        Self {
            spec,
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn spec(&self) -> &FlowSpec {
        &self.spec
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    fn metrics(&self) -> Option<&SharedMetrics> {
        self.client.metrics()
    }

    /// Start a flow call: new invocation id, counted once
    pub fn begin(&self) -> InvocationId {
        let invocation_id = InvocationId::generate();
        if let Some(metrics) = self.metrics() {
            metrics.record_invocation(self.spec.name);
        }
        debug!(flow = self.spec.name, invocation_id = %invocation_id, "Flow received");
        invocation_id
    }

    /// Validate against the input schema, collecting every violation
    pub fn validate_input(&self, input: &Value) -> Result<Value> {
        self.spec
            .input_schema
            .validate(input)
            .map_err(|violations| self.reject(violations))
    }

    fn reject(&self, violations: Vec<ValidationError>) -> PetPalError {
        warn!(
            flow = self.spec.name,
            violations = violations.len(),
            "Flow input rejected"
        );
        if let Some(metrics) = self.metrics() {
            metrics.record_input_rejected(self.spec.name);
        }
        PetPalError::InvalidInput(violations)
    }

    pub fn render(&self, validated: &Value) -> Result<RenderedPrompt> {
        self.spec
            .template
            .render(validated)
            .map_err(|e| self.reject(vec![e]))
    }

    /// Render and invoke a validated input, retrying per the policy
    ///
    /// Rendering problems are input errors. The outer `Result` only carries
    /// those; every model-side failure is in the inner [`Outcome`].
    pub async fn invoke_validated<T: DeserializeOwned>(
        &self,
        validated: &Value,
    ) -> Result<Outcome<T>> {
        let prompt = self.render(validated)?;
        Ok(self.invoke_rendered(prompt).await)
    }

    async fn invoke_rendered<T: DeserializeOwned>(&self, prompt: RenderedPrompt) -> Outcome<T> {
        let mut attempt = 1;
        loop {
            let result = self
                .client
                .invoke(InvocationRequest {
                    label: self.spec.name,
                    system: self.spec.system.as_deref(),
                    prompt: prompt.clone(),
                    output_schema: &self.spec.output_schema,
                    tools: &self.spec.tools,
                })
                .await;

            match result {
                Ok(output) => return deserialize_output(output.value),
                Err(failure) if self.retry.should_retry(attempt, &failure) => {
                    let delay = self.retry.delay_for(attempt, &failure);
                    warn!(
                        flow = self.spec.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Retrying after transient backend error"
                    );
                    if let Some(metrics) = self.metrics() {
                        metrics.record_retry(self.spec.name);
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure),
            }
        }
    }

    /// Model output accepted as-is
    pub fn complete<T>(&self, invocation_id: InvocationId, value: T) -> FlowResult<T> {
        if let Some(metrics) = self.metrics() {
            metrics.record_model_success(self.spec.name);
        }
        info!(flow = self.spec.name, invocation_id = %invocation_id, "Flow returned model output");
        FlowResult {
            value,
            fallback: None,
            invocation_id,
        }
    }

    /// Fixed fallback in place of model output
    pub fn degrade<T>(
        &self,
        invocation_id: InvocationId,
        value: T,
        reason: FallbackReason,
    ) -> FlowResult<T> {
        if let Some(metrics) = self.metrics() {
            metrics.record_fallback(self.spec.name, reason);
        }
        warn!(
            flow = self.spec.name,
            invocation_id = %invocation_id,
            reason = %reason,
            "Flow returned fallback"
        );
        FlowResult {
            value,
            fallback: Some(reason),
            invocation_id,
        }
    }

    /// Map an outcome to a result, building the fallback from the failure
    pub fn settle<T>(
        &self,
        invocation_id: InvocationId,
        outcome: Outcome<T>,
        fallback: impl FnOnce(&InvocationFailure) -> T,
    ) -> FlowResult<T> {
        match outcome {
            Ok(value) => self.complete(invocation_id, value),
            Err(failure) => {
                let value = fallback(&failure);
                self.degrade(invocation_id, value, failure.kind().into())
            }
        }
    }

    /// Validate, render, invoke and settle in one go
    pub async fn run<T: DeserializeOwned>(
        &self,
        input: &Value,
        fallback: impl FnOnce(&InvocationFailure) -> T,
    ) -> Result<FlowResult<T>> {
        let invocation_id = self.begin();
        let validated = self.validate_input(input)?;
        let outcome = self.invoke_validated(&validated).await?;
        Ok(self.settle(invocation_id, outcome, fallback))
    }
}

/// Schema-valid output that still does not fit the typed struct counts as a
/// schema violation.
fn deserialize_output<T: DeserializeOwned>(value: Value) -> Outcome<T> {
    serde_json::from_value(value).map_err(|e| {
        InvocationFailure::SchemaViolation(vec![ValidationError::new(
            ValidationErrorKind::TypeMismatch,
            format!("output does not match the typed result: {}", e),
        )])
    })
}

/// Serialize a typed request so it goes through the same schema checks as
/// raw input.
pub(crate) fn to_input<T: Serialize>(request: &T) -> Result<Value> {
    Ok(serde_json::to_value(request)?)
}

// =============================================================================
// Facade
// =============================================================================

/// All four flows over one shared client and metrics collector
#[derive(Debug, Clone)]
pub struct PetPal {
    symptom_checker: SymptomChecker,
    breed_identifier: BreedIdentifier,
    name_generator: NameGenerator,
    query_assistant: QueryAssistant,
    metrics: SharedMetrics,
}

impl PetPal {
    /// Build every flow over `client`
    ///
    /// The client's metrics collector is reused when present, otherwise a
    /// fresh one is attached.
    pub fn new(client: ModelClient, retry: RetryPolicy) -> Result<Self> {
        let existing = client.metrics().cloned();
        let (client, metrics) = match existing {
            Some(metrics) => (client, metrics),
            None => {
                let metrics = crate::ai::metrics::create_shared_metrics();
                (client.with_metrics(metrics.clone()), metrics)
            }
        };

        Ok(Self {
            symptom_checker: SymptomChecker::new(client.clone())?.with_retry(retry),
            breed_identifier: BreedIdentifier::new(client.clone())?.with_retry(retry),
            name_generator: NameGenerator::new(client.clone())?.with_retry(retry),
            query_assistant: QueryAssistant::new(client)?.with_retry(retry),
            metrics,
        })
    }

    pub fn with_provider(provider: SharedProvider) -> Result<Self> {
        Self::new(ModelClient::new(provider), RetryPolicy::default())
    }

    /// Backend, limits and retry policy taken from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.provider_config())?;
        let client = ModelClient::new(provider).with_options(config.invocation_options());
        Self::new(client, RetryPolicy::from_config(&config.flows))
    }

    pub async fn check_symptoms(
        &self,
        request: &SymptomRequest,
    ) -> Result<FlowResult<SymptomReport>> {
        self.symptom_checker.check(request).await
    }

    pub async fn identify_breed(&self, request: &BreedRequest) -> Result<FlowResult<BreedReport>> {
        self.breed_identifier.identify(request).await
    }

    pub async fn generate_names(&self, request: &NameRequest) -> Result<FlowResult<NameList>> {
        self.name_generator.generate(request).await
    }

    pub async fn ask(&self, request: &QueryRequest) -> Result<FlowResult<QueryAnswer>> {
        self.query_assistant.ask(request).await
    }

    pub fn symptom_checker(&self) -> &SymptomChecker {
        &self.symptom_checker
    }

    pub fn breed_identifier(&self) -> &BreedIdentifier {
        &self.breed_identifier
    }

    pub fn name_generator(&self) -> &NameGenerator {
        &self.name_generator
    }

    pub fn query_assistant(&self) -> &QueryAssistant {
        &self.query_assistant
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::ScriptedProvider;
    use crate::ai::schema::{Field, FieldKind};
    use crate::types::{ErrorCategory, LlmError, PetType};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Echo {
        reply: String,
    }

    fn echo_spec() -> FlowSpec {
        FlowSpec::new(
            "echo",
            ObjectSchema::new().field(Field::required("text", FieldKind::string().min_len(1))),
            ObjectSchema::new().field(Field::required("reply", FieldKind::string())),
            PromptTemplate::builder().text("Say: ").field("text").build(),
        )
        .unwrap()
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn fallback(_: &InvocationFailure) -> Echo {
        Echo {
            reply: "fallback".to_string(),
        }
    }

    #[test]
    fn test_spec_rejects_undeclared_template_fields() {
        let result = FlowSpec::new(
            "broken",
            ObjectSchema::new(),
            ObjectSchema::new(),
            PromptTemplate::builder().field("ghost").build(),
        );
        match result {
            Err(PetPalError::Config(message)) => assert!(message.contains("ghost")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_returns_model_output() {
        let provider = Arc::new(ScriptedProvider::new().then_output(json!({"reply": "hi"})));
        let pipeline = FlowPipeline::new(echo_spec(), ModelClient::from(provider.clone()));

        let result = pipeline.run(&json!({"text": "hi"}), fallback).await.unwrap();
        assert_eq!(result.value, Echo { reply: "hi".into() });
        assert!(!result.is_fallback());
        assert_eq!(provider.requests()[0].prompt_text(), "Say: hi");
    }

    #[tokio::test]
    async fn test_input_error_skips_model() {
        let provider = Arc::new(ScriptedProvider::new());
        let pipeline = FlowPipeline::new(echo_spec(), ModelClient::from(provider.clone()));

        let err = pipeline.run(&json!({"text": ""}), fallback).await.unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .then_error(LlmError::new(ErrorCategory::Transient, "overloaded"))
                .then_output(json!({"reply": "second time"})),
        );
        let metrics = crate::ai::metrics::create_shared_metrics();
        let client = ModelClient::from(provider.clone()).with_metrics(metrics.clone());
        let pipeline = FlowPipeline::new(echo_spec(), client).with_retry(fast_retry(3));

        let result = pipeline.run(&json!({"text": "x"}), fallback).await.unwrap();
        assert_eq!(result.value.reply, "second time");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(metrics.flow("echo").retries, 1);
    }

    #[tokio::test]
    async fn test_schema_violation_is_not_retried() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .then_output(json!({"wrong": true}))
                .then_output(json!({"reply": "never reached"})),
        );
        let pipeline = FlowPipeline::new(echo_spec(), ModelClient::from(provider.clone()))
            .with_retry(fast_retry(3));

        let result = pipeline.run(&json!({"text": "x"}), fallback).await.unwrap();
        assert_eq!(result.fallback, Some(FallbackReason::SchemaViolation));
        assert_eq!(result.value.reply, "fallback");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_stop_at_max_attempts() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .then_error(LlmError::new(ErrorCategory::Network, "reset"))
                .then_error(LlmError::new(ErrorCategory::Network, "reset"))
                .then_output(json!({"reply": "too late"})),
        );
        let pipeline = FlowPipeline::new(echo_spec(), ModelClient::from(provider.clone()))
            .with_retry(fast_retry(2));

        let result = pipeline.run(&json!({"text": "x"}), fallback).await.unwrap();
        assert_eq!(result.fallback, Some(FallbackReason::BackendError));
        assert_eq!(provider.call_count(), 2);
    }

    #[test]
    fn test_delay_grows_and_honors_retry_after() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        let transient =
            InvocationFailure::BackendError(LlmError::new(ErrorCategory::Transient, "busy"));

        let first = policy.delay_for(1, &transient);
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(125));
        let third = policy.delay_for(3, &transient);
        assert!(third >= Duration::from_millis(399) && third < Duration::from_millis(500));
        assert!(policy.delay_for(10, &transient) <= Duration::from_millis(1000));

        let limited = InvocationFailure::BackendError(
            LlmError::new(ErrorCategory::RateLimit, "slow down")
                .retry_after(Duration::from_millis(250)),
        );
        assert_eq!(policy.delay_for(1, &limited), Duration::from_millis(250));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = FlowsConfig {
            max_attempts: 3,
            retry_base_delay_ms: 50,
            ..FlowsConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert!(!policy.should_retry(1, &InvocationFailure::no_output("blank")));
    }

    #[test]
    fn test_flow_result_wire_format() {
        let result = FlowResult {
            value: json!({"names": ["Milo"]}),
            fallback: Some(FallbackReason::EmptyResult),
            invocation_id: InvocationId::generate(),
        };
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["fallback"], "emptyResult");
        assert!(wire["invocationId"].is_string());
    }

    #[tokio::test]
    async fn test_facade_shares_metrics_across_flows() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .then_output(json!({"names": ["Shadow", "Onyx"]}))
                .then_empty("filtered"),
        );
        let petpal = PetPal::with_provider(provider.clone()).unwrap();

        let names = petpal
            .generate_names(&NameRequest {
                pet_type: PetType::Cat,
                style: None,
                count: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(names.value.names, vec!["Shadow", "Onyx"]);

        let answer = petpal
            .ask(&QueryRequest {
                query: "How often should I brush my dog?".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(answer.fallback, Some(FallbackReason::NoOutput));

        let summary = petpal.metrics().summary();
        assert_eq!(summary.model_calls, 2);
        assert_eq!(summary.flows["nameGenerator"].model_successes, 1);
        assert_eq!(summary.flows["queryAssistant"].fallback_no_output, 1);
    }

    #[tokio::test]
    async fn test_concurrent_flow_calls_are_independent() {
        let mut provider = ScriptedProvider::new();
        for i in 0..8 {
            provider = provider.then_output(json!({"reply": format!("r{i}")}));
        }
        let pipeline = FlowPipeline::new(echo_spec(), ModelClient::from(Arc::new(provider)));

        let inputs: Vec<Value> = (0..8).map(|i| json!({"text": format!("t{i}")})).collect();
        let results = futures::future::join_all(
            inputs.iter().map(|input| pipeline.run(input, fallback)),
        )
        .await;

        let ids: std::collections::HashSet<_> = results
            .into_iter()
            .map(|r| r.unwrap().invocation_id)
            .collect();
        assert_eq!(ids.len(), 8);
    }
}
