//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::PollerConfig;
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

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<PollerConfig, ConfigError> {
    let config: PollerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PollerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[poller]\ninterval_ms = 1000\n[storage]\npath = \"services.json\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.poller.interval_ms, 1000);
        assert_eq!(config.storage.path.as_deref(), Some("services.json"));
    }

    #[test]
    fn test_validation_error_message() {
        let err = parse_config("[poller]\ninterval_ms = 0\nmax_concurrent_probes = 0").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Validation failed: "));
        assert!(message.contains("poller.interval_ms"));
        assert!(message.contains("poller.max_concurrent_probes"));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(parse_config("[poller\n"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(load_config(Path::new("/nonexistent/poller.toml")), Err(ConfigError::Io(_))));
    }
}
