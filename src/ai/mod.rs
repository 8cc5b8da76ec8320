//! AI Integration Layer
//!
//! Schemas, prompt templates, tools, model backends and the invocation
//! client that ties them together.

pub mod client;
pub mod metrics;
pub mod prompt;
pub mod provider;
pub mod schema;
pub mod timeout;
pub mod tool;
pub mod validation;

pub use client::{
    InvocationOptions, InvocationOutput, InvocationRequest, ModelClient, ToolCallRecord,
};
pub use metrics::{FlowMetrics, FlowStats, MetricsSummary, SharedMetrics, create_shared_metrics};
pub use prompt::{MediaAttachment, PromptBuilder, PromptTemplate, RenderedPrompt, TemplateNode};
pub use provider::{
    ChatMessage, LlmProvider, LlmResponse, ModelRequest, ModelTurn, OllamaProvider,
    OpenAiProvider, ProviderConfig, ResponseMetadata, ResponseTiming, ScriptedProvider,
    SharedProvider, TokenUsage, ToolCall, ToolDefinition, create_provider,
};
pub use schema::{Field, FieldKind, ObjectSchema, validate};
pub use timeout::with_timeout;
pub use tool::{ToolDeclaration, ToolError, ToolHandler, ToolRegistry};
