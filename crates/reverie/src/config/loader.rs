use std::path::Path;

use crate::config::schema::EnrichmentConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EnrichmentConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EnrichmentConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: EnrichmentConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &EnrichmentConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let base_url = &config.backend.base_url;
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation {
            message: format!("backend.base_url must be an http(s) URL, got '{}'", base_url),
        });
    }

    if config.backend.model.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "backend.model must not be blank".to_string(),
        });
    }

    // A reclaim threshold at or below the task deadline would let a second
    // claim start while the first attempt is still allowed to run.
    if let Some(stale) = config.stale_pending_after_secs {
        if stale <= config.workers.task_deadline_secs {
            return Err(ConfigError::Validation {
                message: format!(
                    "stale_pending_after_secs ({}) must exceed workers.task_deadline_secs ({})",
                    stale, config.workers.task_deadline_secs
                ),
            });
        }
    }

    Ok(())
}
