use std::path::Path;

use fleetmetrics_utils::error::EtlError;

use crate::config::types::EtlConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<ConfigError> for EtlError {
    fn from(error: ConfigError) -> Self {
        EtlError::Config(error.to_string())
    }
}

/// Load the engine config from a YAML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<EtlConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse the engine config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<EtlConfig, ConfigError> {
    let config: EtlConfig = serde_yaml::from_str(yaml)?;
    Ok(config)
}
