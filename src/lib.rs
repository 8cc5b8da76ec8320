//! PetPal - AI Flow Orchestration for Pet Care
//!
//! Four advisory flows (symptom checker, breed identifier, name generator,
//! query assistant) built on a small orchestration core: schema validation,
//! structured prompt templates, a tool registry the model can call into, and
//! a model client that validates every candidate before it reaches a caller.
//!
//! ## Core Features
//!
//! - **Always displayable**: model failures become fixed, schema-valid
//!   fallback answers tagged with a [`FallbackReason`]
//! - **Input errors up front**: all violations collected before any model call
//! - **Tool calls**: explicit request/response round trips, scriptable in tests
//! - **Backends**: OpenAI-compatible and Ollama over HTTP
//!
//! ## Quick Start
//!
//! ```ignore
//! use petpal::{ConfigLoader, PetPal};
//! use petpal::flows::QueryRequest;
//!
//! let config = ConfigLoader::load()?;
//! let petpal = PetPal::from_config(&config)?;
//! let result = petpal
//!     .ask(&QueryRequest { query: "Can cats eat tuna?".into() })
//!     .await?;
//! println!("{}", result.value.answer);
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: schemas, prompt templates, tools, backends and the model client
//! - [`flows`]: the four flow controllers and the [`PetPal`] facade
//! - [`config`]: layered configuration
//! - [`types`]: error types and shared domain types

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod flows;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, PetPalError, Result};

// Domain Types
pub use types::{FallbackReason, InvocationId, PetType};

// Flows
pub use flows::{FlowResult, PetPal, RetryPolicy};

// AI Layer
pub use ai::{ModelClient, ScriptedProvider, create_provider};
