//! Ollama Local LLM Provider
//!
//! Backend for locally-running Ollama models via `/api/chat`. The output
//! schema is passed as `format` so the server constrains decoding; images
//! travel as bare base64 in the message's `images` list.

use async_trait::async_trait;
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
use crate::constants::network::OLLAMA_API_BASE;
use crate::types::{PetPalError, Result};

const PROVIDER: &str = "ollama";
const DEFAULT_MODEL: &str = "llama3.2-vision:latest";

/// Ollama Local LLM Provider
pub struct OllamaProvider {
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_base = config
            .api_base
            .unwrap_or_else(|| OLLAMA_API_BASE.to_string());

        // SSRF guard
        let api_base = Self::validate_endpoint(&api_base)?;

        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PetPalError::LlmApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    /// Only http/https endpoints; warns for non-localhost hosts
    fn validate_endpoint(endpoint: &str) -> Result<String> {
        let url = url::Url::parse(endpoint).map_err(|e| {
            PetPalError::Config(format!("Invalid Ollama endpoint URL '{}': {}", endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(PetPalError::Config(format!(
                "Ollama endpoint must use http or https scheme, got: {}",
                url.scheme()
            )));
        }

        if let Some(host) = url.host_str()
            && !matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
        {
            warn!(
                "Ollama endpoint is not localhost: {}. Ensure this is intentional.",
                host
            );
        }

        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    fn build_request(&self, request: &ModelRequest) -> OllamaChatRequest {
        let mut messages = vec![OllamaMessage::text(
            "system",
            prompt_utils::build_system_prompt(request.system.as_deref(), &request.output_schema),
        )];
        let mut images_sent = false;

        for message in &request.messages {
            messages.push(match message {
                ChatMessage::User { content } => {
                    let mut msg = OllamaMessage::text("user", content.clone());
                    if !images_sent {
                        images_sent = true;
                        msg.images = request
                            .attachments
                            .iter()
                            .map(|a| a.base64_data().to_string())
                            .collect();
                    }
                    msg
                }
                ChatMessage::ToolRequest { calls } => OllamaMessage {
                    tool_calls: calls
                        .iter()
                        .map(|c| OllamaToolCall {
                            function: OllamaFunctionCall {
                                name: c.name.clone(),
                                arguments: c.arguments.clone(),
                            },
                        })
                        .collect(),
                    ..OllamaMessage::text("assistant", String::new())
                },
                ChatMessage::ToolResult { name, content, .. } => OllamaMessage {
                    tool_name: Some(name.clone()),
                    ..OllamaMessage::text("tool", prompt_utils::tool_content(content))
                },
            });
        }

        OllamaChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            format: (!request.output_schema.is_null()).then(|| request.output_schema.clone()),
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
            tools: request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect(),
        }
    }
}

/// Ollama does not assign call ids; they are generated per turn
fn parse_turn(body: OllamaChatResponse) -> ModelTurn {
    if body.done_reason.as_deref() == Some("length") {
        return ModelTurn::empty("completion truncated at the token limit");
    }

    let calls = body.message.tool_calls.unwrap_or_default();
    if !calls.is_empty() {
        return ModelTurn::ToolCalls(
            calls
                .into_iter()
                .map(|c| {
                    ToolCall::new(
                        format!("call_{}", uuid::Uuid::new_v4().simple()),
                        c.function.name,
                        c.function.arguments,
                    )
                })
                .collect(),
        );
    }

    let text = body.message.content.trim();
    if text.is_empty() {
        return ModelTurn::empty(match body.done_reason.as_deref() {
            Some(reason) => format!("completion was empty (done_reason: {})", reason),
            None => "completion was empty".to_string(),
        });
    }

    match extract_json_from_response(text) {
        Ok(value) => ModelTurn::Output(value),
        Err(e) => ModelTurn::empty(e.to_string()),
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, request: &ModelRequest) -> Result<LlmResponse> {
        info!(
            "Generating with Ollama (model: {}, temperature: {})",
            self.model, self.temperature
        );

        let start_time = Instant::now();
        let body = self.build_request(request);
        let url = format!("{}/api/chat", self.api_base);

        debug!(
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending request to Ollama API"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    PetPalError::from(LlmError::with_provider(
                        ErrorCategory::Network,
                        format!(
                            "Failed to reach Ollama at {}: {}. Is Ollama running? Start with: ollama serve",
                            self.api_base, e
                        ),
                        PROVIDER,
                    ))
                } else {
                    PetPalError::LlmApi(format!("Ollama request failed: {}", e))
                }
            })?;

        let elapsed = start_time.elapsed();

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("Ollama API error ({}): {}", status, body),
                PROVIDER,
            )
            .into());
        }

        let response_body: OllamaChatResponse = response.json().await.map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::ParseError,
                format!("Failed to parse Ollama response: {}", e),
                PROVIDER,
            )
        })?;

        let usage = TokenUsage::new(
            response_body.prompt_eval_count.unwrap_or(0),
            response_body.eval_count.unwrap_or(0),
        );

        let turn = parse_turn(response_body);
        if let ModelTurn::Empty { reason } = &turn {
            warn!(reason = %reason, "Ollama returned no candidate");
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
        let url = format!("{}/api/tags", self.api_base);

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(tags) = resp.json::<OllamaTagsResponse>().await {
                    let base = self.model.trim_end_matches(":latest");
                    let model_available = tags
                        .models
                        .iter()
                        .any(|m| m.name == self.model || m.name.starts_with(base));

                    if model_available {
                        info!("Ollama is available with model: {}", self.model);
                        Ok(true)
                    } else {
                        warn!(
                            "Ollama is running but model '{}' not found. Pull with: ollama pull {}",
                            self.model, self.model
                        );
                        Ok(false)
                    }
                } else {
                    info!("Ollama is available");
                    Ok(true)
                }
            }
            Ok(resp) => {
                warn!("Ollama API check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Ollama not available: {}. Start with: ollama serve", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl OllamaMessage {
    fn text(role: &'static str, content: String) -> Self {
        Self {
            role,
            content,
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::prompt::{MediaAttachment, RenderedPrompt};
    use serde_json::json;

    fn provider() -> OllamaProvider {
        OllamaProvider::new(ProviderConfig {
            provider: "ollama".to_string(),
            ..Default::default()
        })
        .expect("Failed to create provider")
    }

    #[test]
    fn test_default_config() {
        let provider = provider();
        assert_eq!(provider.api_base, OLLAMA_API_BASE);
        assert_eq!(provider.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(OllamaProvider::validate_endpoint("file:///etc/passwd").is_err());
        assert!(OllamaProvider::validate_endpoint("not a url").is_err());
        assert_eq!(
            OllamaProvider::validate_endpoint("http://127.0.0.1:11434/").unwrap(),
            "http://127.0.0.1:11434"
        );
    }

    #[test]
    fn test_request_carries_images_and_schema() {
        let attachment =
            MediaAttachment::parse_image("photoDataUri", "data:image/jpeg;base64,QUJD").unwrap();
        let request = ModelRequest::from_prompt(
            RenderedPrompt {
                text: "Identify".to_string(),
                attachments: vec![attachment],
            },
            json!({"type": "object", "required": ["isPetDetected"]}),
        );

        let body = serde_json::to_value(provider().build_request(&request)).unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"]["required"][0], "isPetDetected");
        assert_eq!(body["messages"][1]["images"][0], "QUJD");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_turns() {
        let body: OllamaChatResponse = serde_json::from_value(json!({
            "message": {"role": "assistant", "content": "", "tool_calls": [
                {"function": {"name": "getBreedSpecificIssues", "arguments": {"breed": "poodle"}}}
            ]}
        }))
        .unwrap();
        match parse_turn(body) {
            ModelTurn::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].arguments["breed"], "poodle");
                assert!(calls[0].id.starts_with("call_"));
            }
            other => panic!("unexpected turn: {other:?}"),
        }

        let body: OllamaChatResponse = serde_json::from_value(json!({
            "message": {"role": "assistant", "content": "{\"names\": [\"Mochi\"]}"},
            "prompt_eval_count": 12, "eval_count": 4
        }))
        .unwrap();
        assert_eq!(parse_turn(body), ModelTurn::Output(json!({"names": ["Mochi"]})));

        let body: OllamaChatResponse = serde_json::from_value(json!({
            "message": {"role": "assistant", "content": ""}, "done_reason": "stop"
        }))
        .unwrap();
        assert!(matches!(parse_turn(body), ModelTurn::Empty { .. }));
    }

    #[test]
    fn test_cut_off_completion_is_not_output() {
        let body: OllamaChatResponse = serde_json::from_value(json!({
            "message": {"role": "assistant", "content":
                "{\"potentialCauses\": \"Possible toxin ingestion\", \"recommendations\": \"Call your v"
            },
            "done_reason": "length"
        }))
        .unwrap();
        assert!(matches!(parse_turn(body), ModelTurn::Empty { .. }));

        let body: OllamaChatResponse = serde_json::from_value(json!({
            "message": {"role": "assistant", "content": "{\"names\": [\"Mochi\"]}"},
            "done_reason": "length"
        }))
        .unwrap();
        assert!(matches!(parse_turn(body), ModelTurn::Empty { .. }));
    }
}
