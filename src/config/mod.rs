//! Configuration Management
//!
//! Hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/petpal/config.toml)
//! 3. Project config (./petpal.toml)
//! 4. Environment variables (PETPAL_*)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
