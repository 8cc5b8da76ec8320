//! CLI Common Utilities
//!
//! Shared initialization and result reporting for the flow commands.

use serde::Serialize;
use tokio::runtime::Runtime;

use super::ui::Output;
use crate::config::{Config, ConfigLoader};
use crate::flows::{FlowResult, PetPal};
use crate::types::{PetPalError, Result};

/// How command results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format '{}'. Valid values: text, json", s)),
        }
    }
}

/// Command execution context
///
/// Resolved configuration plus the flows built from it.
pub struct CommandContext {
    pub config: Config,
    pub petpal: PetPal,
    pub format: OutputFormat,
    pub output: Output,
    pub verbose: bool,
}

impl CommandContext {
    /// Load config through the full resolution chain and build every flow
    pub fn load(format: OutputFormat, verbose: bool) -> Result<Self> {
        let config = ConfigLoader::load()?;
        let petpal = PetPal::from_config(&config)?;

        Ok(Self {
            config,
            petpal,
            format,
            output: Output::new(),
            verbose,
        })
    }

    /// Print a flow result as JSON or through `render_text`
    ///
    /// Fallbacks are flagged before the text rendering.
    pub fn report<T: Serialize>(
        &self,
        result: &FlowResult<T>,
        render_text: impl FnOnce(&Output, &T),
    ) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            OutputFormat::Text => {
                if let Some(reason) = result.fallback {
                    self.output.warning(&format!(
                        "AI response unavailable ({}); showing a fallback answer",
                        reason
                    ));
                }
                render_text(&self.output, &result.value);
            }
        }

        if self.verbose {
            self.output.section("Backend");
            self.output.field("Provider", &backend_label(&self.config));
            self.output.section("Metrics");
            self.output
                .paragraph(&self.petpal.metrics().summary().display());
        }
        Ok(())
    }
}

/// `<provider> (model: <model>)`, or the provider default when unset
fn backend_label(config: &Config) -> String {
    let model = config.llm.model.as_deref().unwrap_or("provider default");
    format!("{} (model: {})", config.llm.provider, model)
}

/// Runtime for driving an async flow from a sync command
pub fn runtime() -> Result<Runtime> {
    Runtime::new().map_err(PetPalError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("Text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_backend_label() {
        let mut config = Config::default();
        config.llm.provider = "ollama".to_string();
        config.llm.model = None;
        assert_eq!(backend_label(&config), "ollama (model: provider default)");

        config.llm.model = Some("llava".to_string());
        assert_eq!(backend_label(&config), "ollama (model: llava)");
    }
}
