//! Model Backend Abstraction
//!
//! Defines the [`LlmProvider`] trait spoken by every backend. One call to
//! [`LlmProvider::generate`] is one turn of the conversation: the backend
//! receives the running transcript and answers with either a final structured
//! output, a batch of tool calls, or nothing at all.
//!
//! ## Modules
//!
//! - `openai`: OpenAI-compatible Chat Completions backend
//! - `ollama`: local Ollama `/api/chat` backend
//! - `scripted`: deterministic backend replaying a fixed script

mod ollama;
mod openai;
mod prompt_utils;
mod scripted;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use scripted::ScriptedProvider;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::ai::prompt::{MediaAttachment, RenderedPrompt};
use crate::constants::invocation;
use crate::types::{PetPalError, Result};

// =============================================================================
// Conversation Model
// =============================================================================

/// Tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned identifier echoed back with the result
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry of the running transcript
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    /// Rendered prompt; attachments from the request ride along with it
    User { content: String },
    /// Model turn that requested tools
    ToolRequest { calls: Vec<ToolCall> },
    /// Result of one tool call, either output or an error description
    ToolResult {
        call_id: String,
        name: String,
        content: Value,
        is_error: bool,
    },
}

impl ChatMessage {
    pub fn tool_output(call: &ToolCall, output: Value) -> Self {
        Self::ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: output,
            is_error: false,
        }
    }

    pub fn tool_error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self::ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: serde_json::json!({ "error": message.into() }),
            is_error: true,
        }
    }
}

/// Tool as advertised to a backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments
    pub parameters: Value,
}

/// Everything a backend needs for one turn
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub attachments: Vec<MediaAttachment>,
    /// JSON Schema the final output must satisfy
    pub output_schema: Value,
    pub tools: Vec<ToolDefinition>,
}

impl ModelRequest {
    /// Start a transcript from a rendered prompt
    pub fn from_prompt(prompt: RenderedPrompt, output_schema: Value) -> Self {
        Self {
            system: None,
            messages: vec![ChatMessage::User {
                content: prompt.text,
            }],
            attachments: prompt.attachments,
            output_schema,
            tools: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Text of the first user message
    pub fn prompt_text(&self) -> &str {
        self.messages
            .iter()
            .find_map(|m| match m {
                ChatMessage::User { content } => Some(content.as_str()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// What the backend produced in one turn
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// Final structured candidate (not yet schema-checked)
    Output(Value),
    /// Model wants tool results before answering
    ToolCalls(Vec<ToolCall>),
    /// No candidate: safety filtering, blank or unparseable completion
    Empty { reason: String },
}

impl ModelTurn {
    pub fn empty(reason: impl Into<String>) -> Self {
        Self::Empty {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// LLM Response with Usage Metrics
// =============================================================================

/// One backend turn plus usage metrics
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub turn: ModelTurn,
    /// Token usage metrics
    pub usage: TokenUsage,
    /// Response timing
    pub timing: ResponseTiming,
    /// Provider and model info
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    pub fn with_metrics(
        turn: ModelTurn,
        usage: TokenUsage,
        timing: ResponseTiming,
        metadata: ResponseMetadata,
    ) -> Self {
        Self {
            turn,
            usage,
            timing,
            metadata,
        }
    }
}

/// Token usage metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub input_tokens: u32,
    /// Output tokens (response)
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used (input + output)
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Accumulate usage across turns
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Response timing metrics
#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    /// Total response time in milliseconds (wall clock)
    pub total_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
        }
    }
}

/// Response metadata
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    /// Model used
    pub model: String,
    /// Provider name
    pub provider: String,
}

/// Shared provider handle, immutable after construction
pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for model backends
///
/// API keys are never serialized and are redacted in debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend type: "openai", "ollama"
    pub provider: String,
    /// Model name (provider-specific)
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f32,
    /// API key (OpenAI-compatible backends)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Maximum tokens to generate per turn
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_max_tokens() -> usize {
    invocation::DEFAULT_MAX_TOKENS
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            timeout_secs: invocation::DEFAULT_TIMEOUT_SECS,
            temperature: invocation::DEFAULT_TEMPERATURE,
            api_key: None,
            api_base: None,
            max_tokens: invocation::DEFAULT_MAX_TOKENS,
        }
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// Model backend speaking the turn-based tool protocol
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Produce the next turn for the transcript in `request`
    async fn generate(&self, request: &ModelRequest) -> Result<LlmResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;

    /// Check if the provider is available
    async fn health_check(&self) -> Result<bool>;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config.clone())?)),
        _ => Err(PetPalError::Config(format!(
            "Unknown provider: {}. Supported: openai, ollama",
            config.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_provider_rejected() {
        let config = ProviderConfig {
            provider: "scripted".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_provider(&config),
            Err(PetPalError::Config(_))
        ));
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = ProviderConfig {
            api_key: Some("sk-very-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));

        let serialized = serde_json::to_string(&config).unwrap();
        assert!(!serialized.contains("sk-very-secret"));
    }

    #[test]
    fn test_request_from_prompt() {
        let prompt = RenderedPrompt {
            text: "How often should I feed my kitten?".to_string(),
            attachments: vec![],
        };
        let mut request = ModelRequest::from_prompt(prompt, json!({"type": "object"}))
            .with_system("You are a pet-care assistant.");
        let call = ToolCall::new("call_1", "lookup", json!({}));
        request.push(ChatMessage::ToolRequest {
            calls: vec![call.clone()],
        });
        request.push(ChatMessage::tool_error(&call, "boom"));

        assert_eq!(request.prompt_text(), "How often should I feed my kitten?");
        assert_eq!(request.messages.len(), 3);
        match &request.messages[2] {
            ChatMessage::ToolResult {
                call_id,
                is_error,
                content,
                ..
            } => {
                assert_eq!(call_id, "call_1");
                assert!(is_error);
                assert_eq!(content["error"], "boom");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_usage_accumulates() {
        let mut usage = TokenUsage::new(10, 5);
        usage.add(TokenUsage::new(3, 2));
        assert_eq!(usage.total(), 20);
    }
}
