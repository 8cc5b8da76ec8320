//! Model Invocation Client
//!
//! Runs one model invocation end to end: sends the rendered prompt, serves
//! any tool calls the model makes, and validates the final candidate against
//! the output schema. Exactly one attempt per call; retry policy belongs to
//! the flow layer.
//!
//! ```text
//! prompt ──► generate ──► Output ──► validate ──► Ok(InvocationOutput)
//!               ▲   │
//!               │   ├──► ToolCalls ──► dispatch ──► tool results ─┐
//!               │   │                                             │
//!               └───┼─────────────────────────────────────────────┘
//!                   └──► Empty / error / timeout ──► Err(InvocationFailure)
//! ```

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::ai::metrics::SharedMetrics;
use crate::ai::prompt::RenderedPrompt;
use crate::ai::provider::{ChatMessage, ModelRequest, ModelTurn, SharedProvider, TokenUsage};
use crate::ai::schema::ObjectSchema;
use crate::ai::timeout::with_timeout;
use crate::ai::tool::ToolRegistry;
use crate::constants::invocation;
use crate::types::{ErrorCategory, ErrorClassifier, InvocationFailure, LlmError};

// =============================================================================
// Options & Request
// =============================================================================

/// Per-client invocation limits
#[derive(Debug, Clone, Copy)]
pub struct InvocationOptions {
    /// Deadline for each backend turn
    pub timeout: Duration,
    /// Maximum tool round trips before the invocation is abandoned
    pub max_tool_round_trips: u32,
}

impl Default for InvocationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(invocation::DEFAULT_TIMEOUT_SECS),
            max_tool_round_trips: invocation::DEFAULT_MAX_TOOL_ROUND_TRIPS,
        }
    }
}

/// Inputs of one invocation
#[derive(Debug)]
pub struct InvocationRequest<'a> {
    /// Flow name, used for logs and metrics
    pub label: &'a str,
    pub system: Option<&'a str>,
    pub prompt: RenderedPrompt,
    pub output_schema: &'a ObjectSchema,
    pub tools: &'a ToolRegistry,
}

/// Record of one tool call served during an invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: Value,
    /// Error text fed back to the model, if the call failed
    pub error: Option<String>,
}

/// Successful invocation
#[derive(Debug, Clone)]
pub struct InvocationOutput {
    /// Schema-validated, normalized output
    pub value: Value,
    pub usage: TokenUsage,
    pub tool_calls: Vec<ToolCallRecord>,
    pub round_trips: u32,
}

#[derive(Default)]
struct Tally {
    usage: TokenUsage,
    turns: u32,
    latency_ms: u64,
    round_trips: u32,
    tool_calls: Vec<ToolCallRecord>,
}

// =============================================================================
// Client
// =============================================================================

/// Long-lived, immutable handle over one backend
#[derive(Clone)]
pub struct ModelClient {
    provider: SharedProvider,
    options: InvocationOptions,
    metrics: Option<SharedMetrics>,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model())
            .field("options", &self.options)
            .finish()
    }
}

impl ModelClient {
    pub fn new(provider: SharedProvider) -> Self {
        Self {
            provider,
            options: InvocationOptions::default(),
            metrics: None,
        }
    }

    pub fn with_options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub fn options(&self) -> InvocationOptions {
        self.options
    }

    pub fn metrics(&self) -> Option<&SharedMetrics> {
        self.metrics.as_ref()
    }

    /// Run one invocation
    ///
    /// Never returns a partially-typed value: the output either satisfies
    /// `output_schema` or the call fails with a reason tag.
    #[instrument(
        skip_all,
        fields(flow = %request.label, provider = %self.provider.name())
    )]
    pub async fn invoke(
        &self,
        request: InvocationRequest<'_>,
    ) -> Result<InvocationOutput, InvocationFailure> {
        let label = request.label;
        let mut tally = Tally::default();
        let outcome = self.run(request, &mut tally).await;

        if let Some(metrics) = &self.metrics {
            let errors = tally.tool_calls.iter().filter(|c| c.error.is_some()).count();
            metrics.record_usage(tally.turns, &tally.usage, tally.latency_ms);
            metrics.record_tool_calls(label, tally.tool_calls.len() as u32, errors as u32);
        }

        match outcome {
            Ok(value) => {
                info!(
                    turns = tally.turns,
                    round_trips = tally.round_trips,
                    tokens = tally.usage.total(),
                    "Invocation produced valid output"
                );
                Ok(InvocationOutput {
                    value,
                    usage: tally.usage,
                    tool_calls: tally.tool_calls,
                    round_trips: tally.round_trips,
                })
            }
            Err(failure) => {
                warn!(kind = %failure.kind(), error = %failure, "Invocation failed");
                Err(failure)
            }
        }
    }

    async fn run(
        &self,
        request: InvocationRequest<'_>,
        tally: &mut Tally,
    ) -> Result<Value, InvocationFailure> {
        let mut model_request =
            ModelRequest::from_prompt(request.prompt, request.output_schema.to_json_schema())
                .with_tools(request.tools.definitions());
        if let Some(system) = request.system {
            model_request = model_request.with_system(system);
        }

        loop {
            let response = with_timeout(
                self.options.timeout,
                self.provider.generate(&model_request),
                "model invocation",
            )
            .await
            .map_err(|e| {
                InvocationFailure::BackendError(ErrorClassifier::classify_error(
                    &e,
                    self.provider.name(),
                ))
            })?;

            tally.turns += 1;
            debug!(
                provider = %response.metadata.provider,
                model = %response.metadata.model,
                turn = tally.turns,
                latency_ms = response.timing.total_ms,
                "Backend turn received"
            );
            tally.usage.add(response.usage);
            tally.latency_ms += response.timing.total_ms;

            let calls = match response.turn {
                ModelTurn::Output(candidate) => {
                    return request.output_schema.validate(&candidate).map_err(|violations| {
                        debug!(violations = violations.len(), "Candidate rejected by schema");
                        InvocationFailure::SchemaViolation(violations)
                    });
                }
                ModelTurn::Empty { reason } => return Err(InvocationFailure::NoOutput { reason }),
                ModelTurn::ToolCalls(calls) if calls.is_empty() => {
                    return Err(InvocationFailure::no_output(
                        "tool-call turn carried no calls",
                    ));
                }
                ModelTurn::ToolCalls(calls) => calls,
            };

            if tally.round_trips >= self.options.max_tool_round_trips {
                return Err(InvocationFailure::BackendError(LlmError::with_provider(
                    ErrorCategory::BadRequest,
                    format!(
                        "model exceeded {} tool round trip(s)",
                        self.options.max_tool_round_trips
                    ),
                    self.provider.name(),
                )));
            }
            tally.round_trips += 1;

            model_request.push(ChatMessage::ToolRequest {
                calls: calls.clone(),
            });

            for call in &calls {
                debug!(tool = %call.name, id = %call.id, "Serving tool call");
                let (message, error) = match request.tools.dispatch(&call.name, &call.arguments) {
                    Ok(output) => (ChatMessage::tool_output(call, output), None),
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool call failed, reporting to model");
                        let text = e.to_string();
                        (ChatMessage::tool_error(call, text.clone()), Some(text))
                    }
                };
                model_request.push(message);
                tally.tool_calls.push(ToolCallRecord {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    error,
                });
            }
        }
    }
}

/// Wrap any provider into a client with default options
impl<P> From<Arc<P>> for ModelClient
where
    P: crate::ai::provider::LlmProvider + 'static,
{
    fn from(provider: Arc<P>) -> Self {
        ModelClient::new(provider)
    }
}
