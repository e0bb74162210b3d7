//! Category seed configuration loading from config.toml
//!
//! The categories listed in config.toml are registered on startup so a fresh database comes up
//! with the institution's standard budget kinds. Seeding is additive: existing keys are kept.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Budget categories to register
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

/// Configuration for a single category
#[derive(Debug, Deserialize, Clone)]
pub struct CategoryConfig {
    /// Immutable uppercase key (e.g. `SUBSIDY`)
    pub key: String,
    /// Display name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Loads category configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Default location of the category configuration
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Path of the category configuration: `LEDGER_CONFIG` if set, else ./config.toml
pub fn config_path() -> Result<PathBuf> {
    match std::env::var("LEDGER_CONFIG") {
        Ok(path) => Ok(PathBuf::from(path)),
        Err(std::env::VarError::NotPresent) => Ok(PathBuf::from(DEFAULT_CONFIG_PATH)),
        Err(e) => Err(e.into()),
    }
}

/// Loads category configuration from [`config_path`]
pub fn load_default_config() -> Result<Config> {
    load_config(config_path()?)
}
