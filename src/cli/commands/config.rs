//! Config Command
//!
//! Manage PetPal configuration.
//!
//! Usage:
//!   petpal config show [-f json]
//!   petpal config path
//!   petpal config init [--force]
//!   petpal config check

use crate::ai::provider::create_provider;
use crate::cli::{Output, OutputFormat};
use crate::config::ConfigLoader;
use crate::types::{PetPalError, Result};

/// Show the merged effective configuration
pub fn show(format: OutputFormat) -> Result<()> {
    let config = ConfigLoader::load()?;
    let rendered = ConfigLoader::render_config(&config, format == OutputFormat::Json)?;
    println!("{}", rendered);
    Ok(())
}

/// Show configuration file paths and whether they exist
pub fn path() -> Result<()> {
    let output = Output::new();
    output.header("Configuration files");

    match ConfigLoader::global_config_path() {
        Some(global) => output.field("Global", &describe(&global)),
        None => output.field("Global", "(cannot determine config directory)"),
    }
    output.field("Project", &describe(&ConfigLoader::project_config_path()));
    output.field("Env", "PETPAL_* (nested keys use __, e.g. PETPAL_LLM__MODEL)");
    Ok(())
}

fn describe(path: &std::path::Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found)", path.display())
    }
}

/// Write the commented default global configuration
pub fn init(force: bool) -> Result<()> {
    let path = ConfigLoader::init_global(force)?;
    Output::new().success(&format!("Global configuration: {}", path.display()));
    Ok(())
}

/// Build the configured backend and probe it
pub fn check() -> Result<()> {
    let config = ConfigLoader::load()?;
    let provider = create_provider(&config.provider_config())?;
    let output = Output::new();
    output.info(&format!(
        "Checking {} backend (model: {})",
        provider.name(),
        provider.model()
    ));

    if super::runtime()?.block_on(provider.health_check())? {
        output.success("Backend is reachable");
        Ok(())
    } else {
        Err(PetPalError::Config(format!(
            "{} backend did not pass its health check",
            provider.name()
        )))
    }
}
