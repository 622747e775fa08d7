//! Configuration loading and management
//!
//! This module handles loading configuration from files and environment variables.

use std::path::Path;

use tracing::{debug, info};

use super::types::Config;
use crate::error::ConfigError;

/// Load configuration from a JSON file
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("Failed to parse JSON: {e} at {path:?}"))
    })?;

    config.validate()?;

    info!(
        "Configuration loaded: {} domain mappings, {} static mappings, {} DOIs",
        config.domains.len(),
        config.static_labels.len(),
        config.dois.len()
    );

    Ok(config)
}

/// Load configuration from a JSON string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<Config, ConfigError> {
    let config: Config =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;

    Ok(config)
}

/// Load configuration with environment variable overrides
///
/// Environment variables:
/// - `NETLABELD_LOG_LEVEL`: Override log level
/// - `NETLABELD_IPC_SOCKET`: Override IPC socket path
/// - `NETLABELD_ACCEPT_UNLABELED`: Override the accept-unlabeled flag
///   (`true`/`false`/`1`/`0`)
///
/// # Errors
///
/// Returns `ConfigError` if loading, parsing or an override fails.
pub fn load_config_with_env(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Apply `NETLABELD_*` environment overrides to a loaded configuration
///
/// # Errors
///
/// Returns `ConfigError::EnvError` for unparsable values and re-validates the
/// result.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Ok(level) = std::env::var("NETLABELD_LOG_LEVEL") {
        config.log.level = level;
        debug!("Log level overridden to {}", config.log.level);
    }

    if let Ok(socket) = std::env::var("NETLABELD_IPC_SOCKET") {
        config.ipc.socket_path = socket.into();
        debug!("IPC socket path overridden to {:?}", config.ipc.socket_path);
    }

    if let Ok(accept) = std::env::var("NETLABELD_ACCEPT_UNLABELED") {
        config.accept_unlabeled = parse_bool(&accept).ok_or_else(|| ConfigError::EnvError {
            name: "NETLABELD_ACCEPT_UNLABELED".into(),
            reason: format!("Invalid boolean: {accept}"),
        })?;
        debug!("Accept-unlabeled overridden to {}", config.accept_unlabeled);
    }

    config.validate()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Create a default configuration file at the given path
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be written.
pub fn create_default_config(path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let config = Config::default_config();
    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {e}")))?;

    std::fs::write(path, json)?;
    Ok(())
}
