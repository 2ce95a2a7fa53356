//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::MirrorConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment override for the front domain.
pub const ENV_FRONT_DOMAIN: &str = "WIKIMIRROR_FRONT_DOMAIN";
/// Environment override for the absolute-link rewrite switch.
pub const ENV_REWRITE_ABSOLUTE: &str = "WIKIMIRROR_REWRITE_ABSOLUTE";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", "))]
    Validation(Vec<ValidationError>),
}

/// Load and validate configuration from a TOML file, then apply
/// environment overrides.
pub fn load_config(path: &Path) -> Result<MirrorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: MirrorConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Defaults plus environment overrides, for running without a config file.
pub fn default_config() -> Result<MirrorConfig, ConfigError> {
    let mut config = MirrorConfig::default();
    apply_env_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Environment wins over file values, the way the hosted original let
/// deploy-time bindings override its baked-in defaults.
pub fn apply_env_overrides(config: &mut MirrorConfig) {
    if let Ok(domain) = std::env::var(ENV_FRONT_DOMAIN) {
        if !domain.is_empty() {
            config.proxy.front_domain = domain;
        }
    }
    if let Ok(flag) = std::env::var(ENV_REWRITE_ABSOLUTE) {
        match flag.to_ascii_lowercase().as_str() {
            "yes" | "true" | "1" | "on" => config.rewrite.absolute_links = true,
            "no" | "false" | "0" | "off" => config.rewrite.absolute_links = false,
            other => tracing::warn!(value = other, "unrecognized {ENV_REWRITE_ABSOLUTE} value ignored"),
        }
    }
}
