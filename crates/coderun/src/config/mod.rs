use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::language::{
    CompileConfig, FileExtension, Hint, Language, Placeholders, RunConfig, SourceLayout,
};
use crate::types::ResourceLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Holds the built-in language table; library users can write it out as a
/// starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../coderun.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for coderun
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Scratch directory for per-request workspaces, relative to the
    /// working directory unless absolute.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Serve languages flagged `privileged` (the `terminal` passthrough).
    #[serde(default = "default_allow_privileged")]
    pub allow_privileged: bool,

    /// Upper bound on executions in flight. Unset means unbounded.
    #[serde(default)]
    pub max_concurrent_executions: Option<usize>,

    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Default resource limits applied to all executions.
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// External toolchains resolved through the locator, keyed by program name
    #[serde(default)]
    pub toolchains: HashMap<String, ToolchainConfig>,

    /// Language configurations keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Answer CORS preflights for any origin
    #[serde(default = "default_cors")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            cors: default_cors(),
        }
    }
}

/// How to find one external compiler/runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Arguments for the probe invocation (e.g. `["-version"]`)
    #[serde(default)]
    pub version_args: Vec<String>,

    /// Directories tried, in order, when the PATH probe fails
    #[serde(default)]
    pub search_dirs: Vec<PathBuf>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            allow_privileged: default_allow_privileged(),
            max_concurrent_executions: None,
            server: ServerConfig::default(),
            default_limits: ResourceLimits::default(),
            toolchains: HashMap::new(),
            languages: HashMap::new(),
        }
    }

    /// Get a language by ID
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Language IDs in sorted order
    pub fn language_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Merge resource limits with defaults
    pub fn effective_limits(&self, overrides: Option<&ResourceLimits>) -> ResourceLimits {
        match overrides {
            Some(limits) => self.default_limits.with_overrides(limits),
            None => self.default_limits.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_allow_privileged() -> bool {
    true
}

fn default_bind() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    5000
}

fn default_cors() -> bool {
    true
}
