//! Configuration loading and persistence.

use std::fs;
use std::path::Path;

use crate::config::schema::{apply_defaults, Config};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and persistence.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.0.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a config file, apply defaults and validate.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    apply_defaults(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Persist a config back to disk.
pub fn save_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config)?;
    fs::write(path, rendered)?;
    Ok(())
}
