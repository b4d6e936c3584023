//! Configuration module for the SCIM engine.
//!
//! The engine is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [filter]
//! max_length = 2048
//! unknown_attributes = "error"
//! dialect = "directory"
//!
//! [schema]
//! enterprise_user = true
//!
//! [observability.logging]
//! level = "${SCIM_LOG_LEVEL}"
//! format = "json"
//! ```

mod filter;
mod observability;
mod schema;

use std::path::Path;

pub use filter::*;
pub use observability::*;
pub use schema::*;
use serde::{Deserialize, Serialize};

use crate::scim::SchemaRegistry;

/// Root configuration for the SCIM engine.
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Filter parsing limits and evaluation policy.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Built-in schema selection and custom extensions.
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: EngineConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the schema registry this configuration describes.
    pub fn registry(&self) -> Result<SchemaRegistry, ConfigError> {
        SchemaRegistry::from_config(&self.schema)
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.max_length == 0 {
            return Err(ConfigError::Validation(
                "filter.max_length must be greater than zero".into(),
            ));
        }
        if self.filter.max_depth == 0 {
            return Err(ConfigError::Validation(
                "filter.max_depth must be greater than zero".into(),
            ));
        }

        for extension in &self.schema.extensions {
            if !extension.id.starts_with("urn:") {
                return Err(ConfigError::Validation(format!(
                    "Extension schema id '{}' must be a URN",
                    extension.id
                )));
            }
        }

        // Duplicate URNs, unknown resource types and bad attribute definitions
        self.registry()?;
        Ok(())
    }

    /// Generate the JSON schema for the configuration file.
    #[cfg(feature = "json-schema")]
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EngineConfig)
    }

    /// Generate the JSON schema as a pretty-printed JSON string.
    #[cfg(feature = "json-schema")]
    pub fn json_schema_string() -> Result<String, ConfigError> {
        serde_json::to_string_pretty(&Self::json_schema())
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand `${VAR_NAME}` references, leaving commented-out text alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            // Skip if this variable is inside a comment
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
