//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{EngineConfig, HttpMateConfig, LogFormat, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &HttpMateConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_engine_config(&config.engine)?;
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if cfg!(not(feature = "json-log")) && logging.format == LogFormat::Json {
        return Err(ConfigError::validation(
            "JSON log format requires the 'json-log' feature",
        ));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Log filter targets must not be empty (got {target:?})"
        )));
    }

    Ok(())
}

/// Validates engine settings.
fn validate_engine_config(engine: &EngineConfig) -> ConfigResult<()> {
    if engine.start_chain.is_empty() {
        return Err(ConfigError::missing_field("engine.start_chain"));
    }

    if engine.start_chain.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(format!(
            "Start chain name cannot contain whitespace: {:?}",
            engine.start_chain
        )));
    }

    if let Some(path) = &engine.topology_file
        && path.is_dir()
    {
        return Err(ConfigError::validation(format!(
            "Topology file points to a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&HttpMateConfig::default()).is_ok());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = HttpMateConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "logging.file_path"
        ));

        config.logging.file_path = Some("httpmate.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_start_chain_must_be_a_name() {
        let mut config = HttpMateConfig::default();
        config.engine.start_chain = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.engine.start_chain = "PRE PROCESS".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_topology_file_cannot_be_a_directory() {
        let mut config = HttpMateConfig::default();
        config.engine.topology_file = Some(std::env::temp_dir());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_filter_target_is_rejected() {
        let mut config = HttpMateConfig::default();
        config
            .logging
            .filters
            .insert(" ".to_string(), Default::default());
        assert!(validate_config(&config).is_err());
    }
}
