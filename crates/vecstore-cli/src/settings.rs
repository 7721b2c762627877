//! Configuration loading for the CLI
//!
//! Starts from the config file (or defaults) and applies environment
//! overrides on top.

use std::path::Path;
use std::str::FromStr;

use vecstore_core::{AppConfig, ConfigError};

/// Load configuration from `path` if given, then apply the environment
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    let config = with_env_override(config, |key| std::env::var(key).ok())?;
    config.database.validate()?;

    Ok(config)
}

/// Apply `DATABASE_URL`, `VECSTORE_*` and `LOG_*` values found by `lookup`
pub fn with_env_override(
    mut config: AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    if let Some(url) = lookup("DATABASE_URL") {
        config.database.connection_string = url;
    }
    if let Some(schema) = lookup("VECSTORE_SCHEMA") {
        config.database.schema_name = schema;
    }
    if let Some(value) = lookup("VECSTORE_MAX_DIMENSION") {
        config.database.max_dimension = parse("VECSTORE_MAX_DIMENSION", &value)?;
    }
    if let Some(value) = lookup("VECSTORE_POOL_SIZE") {
        config.database.pool_size = parse("VECSTORE_POOL_SIZE", &value)?;
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(value) = lookup("LOG_JSON") {
        config.logging.json_format = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
    }

    Ok(config)
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
