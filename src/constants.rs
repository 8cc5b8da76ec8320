//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! User-facing fallback texts live here so every flow and test refers to the
//! same literal.

/// Model invocation constants
pub mod invocation {
    /// Default timeout for one backend call (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Maximum tool round trips within a single invocation
    pub const DEFAULT_MAX_TOOL_ROUND_TRIPS: u32 = 5;

    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Default completion budget
    pub const DEFAULT_MAX_TOKENS: usize = 2048;
}

/// Flow-level retry constants
pub mod retry {
    /// Attempts per flow call (1 = no retry)
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

    /// Upper bound accepted by config validation
    pub const MAX_ATTEMPTS_LIMIT: u32 = 5;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;
}

/// Name generator bounds
pub mod names {
    pub const MIN_COUNT: u32 = 1;
    pub const MAX_COUNT: u32 = 20;
    pub const DEFAULT_COUNT: u32 = 10;
}

/// Query assistant bounds
pub mod query {
    pub const MIN_QUERY_LEN: usize = 3;
}

/// Fixed fallback texts returned when a model invocation fails
pub mod fallback {
    pub const SYMPTOM_CAUSES: &str =
        "Could not determine potential causes at this time. The AI model did not provide a response.";
    pub const SYMPTOM_RECOMMENDATIONS: &str =
        "Please try rephrasing the symptoms or consult a veterinarian directly for advice.";
    pub const SYMPTOM_WARNING: &str =
        "If your pet's condition is serious, please seek veterinary attention immediately.";

    pub const BREED_INVALID_IMAGE: &str = "Invalid image data. Please upload a valid image file.";
    pub const BREED_NO_OUTPUT: &str = "The AI model did not return a response. Please try again.";
    pub const BREED_UNEXPECTED: &str =
        "An unexpected error occurred during breed identification.";

    pub const NAMES_RETRY: &str = "Try again with different criteria.";

    pub const QUERY_NO_OUTPUT: &str =
        "I'm sorry, I couldn't process your request at the moment. Please try again.";
    pub const QUERY_UNEXPECTED: &str = "I encountered an issue while trying to understand your question. Please rephrase or try again later.";
}

/// Network constants
pub mod network {
    /// Default OpenAI-compatible API base
    pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

    /// Default local Ollama endpoint
    pub const OLLAMA_API_BASE: &str = "http://localhost:11434";
}
