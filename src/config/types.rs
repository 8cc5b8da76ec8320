//! Configuration Types
//!
//! All configuration structures with sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ai::client::InvocationOptions;
use crate::ai::provider::ProviderConfig;
use crate::constants::{invocation, retry};
use crate::types::{PetPalError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Model backend settings
    pub llm: LlmConfig,

    /// Flow execution settings
    pub flows: FlowsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            flows: FlowsConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `PetPalError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.llm.provider.as_str(), "openai" | "ollama") {
            return Err(PetPalError::Config(format!(
                "Unknown LLM provider '{}'. Supported: openai, ollama",
                self.llm.provider
            )));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(PetPalError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(PetPalError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(PetPalError::Config(
                "LLM max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.flows.max_tool_round_trips == 0 {
            return Err(PetPalError::Config(
                "flows.max_tool_round_trips must be at least 1".to_string(),
            ));
        }

        if !(1..=retry::MAX_ATTEMPTS_LIMIT).contains(&self.flows.max_attempts) {
            return Err(PetPalError::Config(format!(
                "flows.max_attempts must be between 1 and {}, got {}",
                retry::MAX_ATTEMPTS_LIMIT,
                self.flows.max_attempts
            )));
        }

        Ok(())
    }

    /// Backend settings in the form the provider factory expects
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.llm.provider.clone(),
            model: self.llm.model.clone(),
            timeout_secs: self.llm.timeout_secs,
            temperature: self.llm.temperature,
            api_key: self.llm.api_key.clone(),
            api_base: self.llm.api_base.clone(),
            max_tokens: self.llm.max_tokens,
        }
    }

    pub fn invocation_options(&self) -> InvocationOptions {
        InvocationOptions {
            timeout: Duration::from_secs(self.llm.timeout_secs),
            max_tool_round_trips: self.flows.max_tool_round_trips,
        }
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" or "ollama"
    pub provider: String,

    /// Model name; provider default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Per-turn request timeout in seconds
    pub timeout_secs: u64,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion budget per turn
    pub max_tokens: usize,

    /// Custom endpoint (OpenAI-compatible gateway or remote Ollama)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// Never serialized back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            timeout_secs: invocation::DEFAULT_TIMEOUT_SECS,
            temperature: invocation::DEFAULT_TEMPERATURE,
            max_tokens: invocation::DEFAULT_MAX_TOKENS,
            api_base: None,
            api_key: None,
        }
    }
}

// =============================================================================
// Flow Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowsConfig {
    /// Tool round trips allowed within one invocation
    pub max_tool_round_trips: u32,

    /// Attempts per flow call for retryable backend errors (1 = no retry)
    pub max_attempts: u32,

    /// Base delay of the exponential retry backoff
    pub retry_base_delay_ms: u64,
}

impl Default for FlowsConfig {
    fn default() -> Self {
        Self {
            max_tool_round_trips: invocation::DEFAULT_MAX_TOOL_ROUND_TRIPS,
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: retry::BASE_DELAY_MS,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
