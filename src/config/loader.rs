//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/petpal/config.toml)
//! 3. Project config (./petpal.toml)
//! 4. Environment variables (PETPAL_* prefix, `__` between sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{PetPalError, Result};

const ENV_PREFIX: &str = "PETPAL_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_layers(
            Self::global_config_path().as_deref(),
            &Self::project_config_path(),
            ENV_PREFIX,
        )
    }

    fn load_layers(global: Option<&Path>, project: &Path, env_prefix: &str) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(project));
        }

        // PETPAL_LLM__MODEL -> llm.model; single underscores stay inside keys
        figment = figment.merge(Env::prefixed(env_prefix).split("__"));

        let config: Config = figment
            .extract()
            .map_err(|e| PetPalError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| PetPalError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory (~/.config/petpal/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("petpal"))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_config_path() -> PathBuf {
        PathBuf::from("petpal.toml")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Rendered effective configuration, TOML or JSON
    pub fn render_config(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| PetPalError::Config(e.to_string()))
        }
    }

    /// Write the commented default global config
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            PetPalError::Config("Cannot determine global config directory".to_string())
        })?;
        Self::init_at(&global_dir.join("config.toml"), force)
    }

    fn init_at(config_path: &Path, force: bool) -> Result<PathBuf> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !config_path.exists() || force {
            fs::write(config_path, Self::default_global_config())?;
            info!("Created global config: {}", config_path.display());
        } else {
            info!("Global config exists: {}", config_path.display());
        }

        Ok(config_path.to_path_buf())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn default_global_config() -> &'static str {
        r#"# PetPal Global Configuration
# User-wide defaults. ./petpal.toml and PETPAL_* variables override these.

version = "1.0"

[llm]
# "openai" or "ollama"
provider = "openai"
# model = "gpt-4o-mini"
timeout_secs = 120
temperature = 0.7
max_tokens = 2048
# api_base = "http://localhost:11434"
# API keys belong in the environment: OPENAI_API_KEY or PETPAL_LLM__API_KEY

[flows]
# Tool round trips allowed within one model invocation
max_tool_round_trips = 5
# Attempts per flow call for transient backend errors (1 = no retry)
max_attempts = 1
retry_base_delay_ms = 500
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_files() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::load_layers(
            None,
            &temp_dir.path().join("petpal.toml"),
            "PETPAL_LOADERTEST_NONE_",
        )
        .unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn test_project_overrides_global() {
        let temp_dir = TempDir::new().unwrap();
        let global = temp_dir.path().join("global.toml");
        let project = temp_dir.path().join("petpal.toml");

        fs::write(
            &global,
            "[llm]\nprovider = \"ollama\"\nmodel = \"llava\"\n[flows]\nmax_attempts = 3\n",
        )
        .unwrap();
        fs::write(&project, "[llm]\nmodel = \"llama3.2-vision\"\n").unwrap();

        let config =
            ConfigLoader::load_layers(Some(&global), &project, "PETPAL_LOADERTEST_LAYER_").unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model.as_deref(), Some("llama3.2-vision"));
        assert_eq!(config.flows.max_attempts, 3);
        assert_eq!(config.flows.max_tool_round_trips, 5);
    }

    #[test]
    fn test_env_override_with_nested_keys() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: variable names are unique to this test
        unsafe {
            env::set_var("PETPAL_LOADERTEST_ENV_LLM__TIMEOUT_SECS", "45");
            env::set_var("PETPAL_LOADERTEST_ENV_FLOWS__MAX_TOOL_ROUND_TRIPS", "2");
        }
        let config = ConfigLoader::load_layers(
            None,
            &temp_dir.path().join("petpal.toml"),
            "PETPAL_LOADERTEST_ENV_",
        )
        .unwrap();
        unsafe {
            env::remove_var("PETPAL_LOADERTEST_ENV_LLM__TIMEOUT_SECS");
            env::remove_var("PETPAL_LOADERTEST_ENV_FLOWS__MAX_TOOL_ROUND_TRIPS");
        }

        assert_eq!(config.llm.timeout_secs, 45);
        assert_eq!(config.flows.max_tool_round_trips, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[llm]\ntemperature = 5.0\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(PetPalError::Config(_))
        ));
    }

    #[test]
    fn test_init_writes_loadable_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        ConfigLoader::init_at(&path, false).unwrap();
        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.flows.retry_base_delay_ms, 500);

        fs::write(&path, "version = \"9\"\n").unwrap();
        ConfigLoader::init_at(&path, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "version = \"9\"\n");

        ConfigLoader::init_at(&path, true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("[flows]"));
    }

    #[test]
    fn test_render_config() {
        let config = Config::default();
        let toml = ConfigLoader::render_config(&config, false).unwrap();
        assert!(toml.contains("[flows]"));
        let json = ConfigLoader::render_config(&config, true).unwrap();
        assert!(json.contains("\"max_attempts\": 1"));
    }
}
