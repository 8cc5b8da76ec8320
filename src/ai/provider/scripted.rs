//! Scripted Provider
//!
//! Deterministic backend that replays a fixed queue of turns. Every request
//! is recorded so tests can assert on what the model would have seen and on
//! how many calls were made.
//!
//! ```ignore
//! let provider = ScriptedProvider::new()
//!     .then_tool_call("getBreedSpecificIssues", json!({"breed": "Labrador"}))
//!     .then_output(json!({"potentialCauses": "...", "recommendations": "..."}));
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::{
    LlmError, LlmProvider, LlmResponse, ModelRequest, ModelTurn, ResponseMetadata, ResponseTiming,
    TokenUsage, ToolCall,
};
use crate::types::{ErrorCategory, Result};

const PROVIDER: &str = "scripted";

enum ScriptStep {
    Turn(ModelTurn),
    Fail(LlmError),
}

/// Backend replaying scripted turns in order
#[derive(Default)]
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<ModelRequest>>,
    calls: AtomicU32,
    latency: Option<Duration>,
    usage_per_turn: TokenUsage,
}

impl std::fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("calls", &self.call_count())
            .field("latency", &self.latency)
            .finish()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: ScriptStep) -> Self {
        lock(&self.steps).push_back(step);
        self
    }

    /// Final structured candidate
    pub fn then_output(self, value: Value) -> Self {
        self.push(ScriptStep::Turn(ModelTurn::Output(value)))
    }

    /// Single tool call with a sequential id
    pub fn then_tool_call(self, name: &str, arguments: Value) -> Self {
        let id = format!("call_{}", lock(&self.steps).len() + 1);
        self.then_tool_calls(vec![ToolCall::new(id, name, arguments)])
    }

    pub fn then_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(ScriptStep::Turn(ModelTurn::ToolCalls(calls)))
    }

    /// No candidate at all
    pub fn then_empty(self, reason: &str) -> Self {
        self.push(ScriptStep::Turn(ModelTurn::empty(reason)))
    }

    /// Backend failure
    pub fn then_error(self, error: LlmError) -> Self {
        self.push(ScriptStep::Fail(error))
    }

    /// Delay applied before every turn
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Usage reported for every turn
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage_per_turn = usage;
        self
    }

    /// Number of `generate` calls made so far
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Copies of every request received, in order
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }

    /// Turns not yet consumed
    pub fn remaining(&self) -> usize {
        lock(&self.steps).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::error!("ScriptedProvider mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, request: &ModelRequest) -> Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let step = lock(&self.steps).pop_front();
        let turn = match step {
            Some(ScriptStep::Turn(turn)) => turn,
            Some(ScriptStep::Fail(error)) => return Err(error.into()),
            None => {
                return Err(LlmError::with_provider(
                    ErrorCategory::BadRequest,
                    "script exhausted",
                    PROVIDER,
                )
                .into());
            }
        };

        Ok(LlmResponse::with_metrics(
            turn,
            self.usage_per_turn,
            ResponseTiming::from_duration(self.latency.unwrap_or_default()),
            ResponseMetadata {
                model: PROVIDER.to_string(),
                provider: PROVIDER.to_string(),
            },
        ))
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        PROVIDER
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PetPalError;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let provider = ScriptedProvider::new()
            .then_tool_call("lookup", json!({"breed": "poodle"}))
            .then_output(json!({"ok": true}));
        let request = ModelRequest::default();

        let first = provider.generate(&request).await.unwrap();
        assert!(matches!(first.turn, ModelTurn::ToolCalls(ref c) if c[0].id == "call_1"));
        assert_eq!(first.metadata.provider, "scripted");
        assert_eq!(first.metadata.model, provider.model());

        let second = provider.generate(&request).await.unwrap();
        assert_eq!(second.turn, ModelTurn::Output(json!({"ok": true})));

        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.requests().len(), 2);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_errors_and_exhaustion() {
        let provider = ScriptedProvider::new()
            .then_error(LlmError::new(ErrorCategory::RateLimit, "slow down"));
        let request = ModelRequest::default();

        let err = provider.generate(&request).await.unwrap_err();
        assert!(matches!(err, PetPalError::Llm(ref e) if e.category == ErrorCategory::RateLimit));

        let err = provider.generate(&request).await.unwrap_err();
        assert!(err.to_string().contains("script exhausted"));
    }
}
