//! OpenAI API Provider
//!
//! Backend using the Chat Completions API with function tools. Images are
//! sent as `image_url` content parts carrying the original data URI.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    ChatMessage, ErrorCategory, ErrorClassifier, LlmError, LlmProvider, LlmResponse, ModelRequest,
    ModelTurn, ProviderConfig, ResponseMetadata, ResponseTiming, TokenUsage, ToolCall,
    prompt_utils,
};
use crate::ai::validation::extract_json_from_response;
use crate::constants::network::OPENAI_API_BASE;
use crate::types::{PetPalError, Result};

const PROVIDER: &str = "openai";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// Never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                PetPalError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY or PETPAL_LLM__API_KEY"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .unwrap_or_else(|| OPENAI_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PetPalError::LlmApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn build_request(&self, request: &ModelRequest) -> ChatCompletionRequest {
        let mut messages = vec![OpenAiMessage::text(
            "system",
            prompt_utils::build_system_prompt(request.system.as_deref(), &request.output_schema),
        )];
        let mut attachments_sent = false;

        for message in &request.messages {
            messages.push(match message {
                ChatMessage::User { content } if !attachments_sent => {
                    attachments_sent = true;
                    user_message(content, request)
                }
                ChatMessage::User { content } => OpenAiMessage::text("user", content.clone()),
                ChatMessage::ToolRequest { calls } => OpenAiMessage {
                    role: "assistant",
                    content: None,
                    tool_calls: calls.iter().map(OpenAiToolCall::from_call).collect(),
                    tool_call_id: None,
                },
                ChatMessage::ToolResult {
                    call_id, content, ..
                } => OpenAiMessage {
                    role: "tool",
                    content: Some(MessageContent::Text(prompt_utils::tool_content(content))),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(call_id.clone()),
                },
            });
        }

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            tools: request
                .tools
                .iter()
                .map(|t| OpenAiTool {
                    kind: "function",
                    function: FunctionDefinition {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        }
    }

    fn classify_send_error(&self, err: reqwest::Error) -> PetPalError {
        if err.is_timeout() || err.is_connect() {
            LlmError::with_provider(
                ErrorCategory::Network,
                format!("OpenAI request failed: {}", err),
                PROVIDER,
            )
            .into()
        } else {
            PetPalError::LlmApi(format!("OpenAI request failed: {}", err))
        }
    }
}

fn user_message(content: &str, request: &ModelRequest) -> OpenAiMessage {
    if request.attachments.is_empty() {
        return OpenAiMessage::text("user", content.to_string());
    }

    let mut parts = vec![ContentPart::Text {
        text: content.to_string(),
    }];
    parts.extend(request.attachments.iter().map(|a| ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: a.data_uri.clone(),
        },
    }));

    OpenAiMessage {
        role: "user",
        content: Some(MessageContent::Parts(parts)),
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

/// Map the first choice onto a protocol turn
fn parse_turn(body: ChatCompletionResponse) -> ModelTurn {
    let Some(choice) = body.choices.into_iter().next() else {
        return ModelTurn::empty("response contained no choices");
    };

    match choice.finish_reason.as_deref() {
        Some("content_filter") => return ModelTurn::empty("response blocked by content filter"),
        Some("length") => return ModelTurn::empty("completion truncated at the token limit"),
        _ => {}
    }

    let calls = choice.message.tool_calls.unwrap_or_default();
    if !calls.is_empty() {
        return ModelTurn::ToolCalls(
            calls
                .into_iter()
                .map(|c| {
                    let arguments = serde_json::from_str(&c.function.arguments)
                        .unwrap_or(Value::String(c.function.arguments));
                    ToolCall::new(c.id, c.function.name, arguments)
                })
                .collect(),
        );
    }

    match choice.message.content.as_deref().map(str::trim) {
        None | Some("") => ModelTurn::empty("completion was empty"),
        Some(text) => match extract_json_from_response(text) {
            Ok(value) => ModelTurn::Output(value),
            Err(e) => ModelTurn::empty(e.to_string()),
        },
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, request: &ModelRequest) -> Result<LlmResponse> {
        info!(
            "Generating with OpenAI (model: {}, temperature: {})",
            self.model, self.temperature
        );

        let start_time = Instant::now();
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending request to OpenAI API"
        );

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_send_error(e))?;

        let elapsed = start_time.elapsed();

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("OpenAI API error ({}): {}", status, body),
                PROVIDER,
            )
            .into());
        }

        let response_body: ChatCompletionResponse = response.json().await.map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::ParseError,
                format!("Failed to parse OpenAI response: {}", e),
                PROVIDER,
            )
        })?;

        let usage = response_body
            .usage
            .as_ref()
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let turn = parse_turn(response_body);
        if let ModelTurn::Empty { reason } = &turn {
            warn!(reason = %reason, "OpenAI returned no candidate");
        }

        Ok(LlmResponse::with_metrics(
            turn,
            usage,
            ResponseTiming::from_duration(elapsed),
            ResponseMetadata {
                model: self.model.clone(),
                provider: PROVIDER.to_string(),
            },
        ))
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.api_base);

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("OpenAI API is available");
                Ok(true)
            }
            Ok(resp) => {
                warn!("OpenAI API check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("OpenAI API check failed: {}", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: &'static str, content: String) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(content)),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDefinition,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

impl OpenAiToolCall {
    fn from_call(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: FunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }
    }
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::prompt::{MediaAttachment, RenderedPrompt};
    use crate::ai::provider::ToolDefinition;
    use serde_json::json;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(ProviderConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn response(value: Value) -> ChatCompletionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_with_image_and_tools() {
        let attachment =
            MediaAttachment::parse_image("photoDataUri", "data:image/png;base64,AAAA").unwrap();
        let request = ModelRequest::from_prompt(
            RenderedPrompt {
                text: "Identify this pet".to_string(),
                attachments: vec![attachment],
            },
            json!({"type": "object"}),
        )
        .with_tools(vec![ToolDefinition {
            name: "lookup".to_string(),
            description: "Look things up".to_string(),
            parameters: json!({"type": "object"}),
        }]);

        let body = serde_json::to_value(provider().build_request(&request)).unwrap();

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"][0]["type"], "text");
        assert_eq!(body["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "lookup");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_tool_round_trip_messages() {
        let mut request = ModelRequest::from_prompt(
            RenderedPrompt {
                text: "hi".to_string(),
                attachments: vec![],
            },
            Value::Null,
        );
        let call = ToolCall::new("call_9", "lookup", json!({"breed": "poodle"}));
        request.push(ChatMessage::ToolRequest {
            calls: vec![call.clone()],
        });
        request.push(ChatMessage::tool_output(&call, json!({"issues": ["x"]})));

        let body = serde_json::to_value(provider().build_request(&request)).unwrap();
        let assistant = &body["messages"][2];
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["tool_calls"][0]["id"], "call_9");
        assert_eq!(
            assistant["tool_calls"][0]["function"]["arguments"],
            r#"{"breed":"poodle"}"#
        );
        let tool = &body["messages"][3];
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_9");
        assert_eq!(tool["content"], r#"{"issues":["x"]}"#);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_output_turn() {
        let turn = parse_turn(response(json!({
            "choices": [{"message": {"content": "{\"answer\": \"Yes\"}"}, "finish_reason": "stop"}]
        })));
        assert_eq!(turn, ModelTurn::Output(json!({"answer": "Yes"})));
    }

    #[test]
    fn test_parse_tool_call_turn() {
        let turn = parse_turn(response(json!({
            "choices": [{"message": {"content": null, "tool_calls": [{
                "id": "call_1", "type": "function",
                "function": {"name": "getBreedSpecificIssues", "arguments": "{\"breed\":\"Labrador\"}"}
            }]}, "finish_reason": "tool_calls"}]
        })));
        assert_eq!(
            turn,
            ModelTurn::ToolCalls(vec![ToolCall::new(
                "call_1",
                "getBreedSpecificIssues",
                json!({"breed": "Labrador"})
            )])
        );
    }

    #[test]
    fn test_parse_empty_turns() {
        let filtered = parse_turn(response(json!({
            "choices": [{"message": {"content": "{}"}, "finish_reason": "content_filter"}]
        })));
        assert!(matches!(filtered, ModelTurn::Empty { .. }));

        let blank = parse_turn(response(json!({
            "choices": [{"message": {"content": "  "}}]
        })));
        assert!(matches!(blank, ModelTurn::Empty { .. }));

        let truncated = parse_turn(response(json!({
            "choices": [{"message": {"content": "{\"answer\": \"Yes\"}"}, "finish_reason": "length"}]
        })));
        assert!(matches!(truncated, ModelTurn::Empty { .. }));

        let none = parse_turn(response(json!({"choices": []})));
        assert!(matches!(none, ModelTurn::Empty { .. }));

        let prose = parse_turn(response(json!({
            "choices": [{"message": {"content": "I'd rather not say."}}]
        })));
        assert!(matches!(prose, ModelTurn::Empty { .. }));
    }

    #[test]
    fn test_cut_off_completion_is_not_output() {
        let turn = parse_turn(response(json!({
            "choices": [{"message": {"content":
                "{\"potentialCauses\": \"Possible toxin ingestion\", \"recommendations\": \"Call your v"
            }, "finish_reason": "length"}]
        })));
        assert!(matches!(turn, ModelTurn::Empty { .. }));

        // Same text without a finish reason still fails to parse
        let turn = parse_turn(response(json!({
            "choices": [{"message": {"content":
                "{\"potentialCauses\": \"Possible toxin ingestion\", \"recommendations\": \"Call your v"
            }}]
        })));
        assert!(matches!(turn, ModelTurn::Empty { .. }));
    }
}
