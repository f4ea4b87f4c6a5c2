//! Configuration file loading for coderun
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, EXAMPLE_CONFIG, SourceLayout};

/// Prefix for environment overrides (`CODERUN__SERVER__PORT=8080`)
pub const ENV_PREFIX: &str = "CODERUN";

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the layered service configuration.
    ///
    /// Layers, lowest precedence first: the embedded defaults, the optional
    /// file at `path`, `CODERUN__*` environment variables, and `PORT`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::ReadFile {
                    path: path.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(limit) = self.default_limits.wall_time_limit
            && !(limit.is_finite() && limit > 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "default wall_time_limit must be positive, got {limit}"
            )));
        }
        if self.max_concurrent_executions == Some(0) {
            return Err(ConfigError::Invalid(
                "max_concurrent_executions must be at least 1".to_owned(),
            ));
        }

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }
            if lang.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
            if lang.source == SourceLayout::Inline {
                if lang.is_compiled() {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' passes code inline and cannot have a compile step"
                    )));
                }
                if !lang.run.command.iter().any(|arg| arg.contains("{code}")) {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' passes code inline but its run command has no {{code}}"
                    )));
                }
            }
            if let Some(ref compile) = lang.compile {
                if compile.command.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' has empty compile command"
                    )));
                }
                let output = &compile.output_name;
                if output.is_empty() || output.contains('/') || output.contains("..") {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' has invalid output name '{output}'"
                    )));
                }
            }
        }

        Ok(())
    }
}
