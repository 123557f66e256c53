//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ShieldConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ShieldConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse TOML text, apply environment overrides and validate.
pub fn parse_config(content: &str) -> Result<ShieldConfig, ConfigError> {
    let mut config: ShieldConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Secrets and connection strings may come from the environment instead of the file.
pub fn apply_env_overrides<F>(config: &mut ShieldConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup("SHIELD_UPSTREAM_TOKEN").filter(|t| !t.is_empty()) {
        config.upstream.token = Some(token);
    }
    if let Some(url) = lookup("REDIS_URL").filter(|u| !u.is_empty()) {
        config.store.redis_url = Some(url);
    }
    if let Some(key) = lookup("SHIELD_ADMIN_KEY").filter(|k| !k.is_empty()) {
        config.auth.admin_key = key;
    }
}
