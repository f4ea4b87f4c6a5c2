use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::ResourceLimits;

const INVALID_FILE_EXT_CHARS: [char; 3] = ['/', '\\', '.'];

/// Build/run recipe for one programming language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "Java (OpenJDK)")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// How the source is placed on disk
    #[serde(default)]
    pub source: SourceLayout,

    /// Runs caller-supplied shell commands rather than a program file
    #[serde(default)]
    pub privileged: bool,

    /// Drop blank lines from failure diagnostics
    #[serde(default)]
    pub compact_diagnostics: bool,

    /// Hint appended to failure messages that mention the toolchain
    #[serde(default)]
    pub hint: Option<Hint>,

    /// Resource limits for this language (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,

    /// Compilation configuration (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    pub run: RunConfig,
}

impl Language {
    /// Check if the language is compiled
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Get the source file name for this language, or `None` when the code
    /// is passed inline
    pub fn source_name(&self, stem: &str, class: Option<&str>) -> Option<String> {
        match self.source {
            SourceLayout::Generic => Some(format!("{stem}.{}", self.extension)),
            SourceLayout::JavaClass => Some(format!(
                "{}.{}",
                class.unwrap_or(stem),
                self.extension
            )),
            SourceLayout::Inline => None,
        }
    }

    /// Expand placeholders in the given command
    ///
    /// Substitution is single-pass, so placeholder-like text inside a
    /// substituted value (e.g. user code containing `{source}`) is kept as is.
    pub fn expand_command(command: &[String], values: &Placeholders<'_>) -> Vec<String> {
        command.iter().map(|arg| values.expand(arg)).collect()
    }
}

/// Values substituted into command templates
///
/// Placeholders: `{source}`, `{binary}`, `{dir}`, `{class}`, `{code}`, `{stem}`
#[derive(Debug, Clone, Copy, Default)]
pub struct Placeholders<'a> {
    pub source: &'a str,
    pub binary: &'a str,
    pub dir: &'a str,
    pub class: &'a str,
    pub code: &'a str,
    pub stem: &'a str,
}

impl Placeholders<'_> {
    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "source" => Some(self.source),
            "binary" | "output" => Some(self.binary),
            "dir" => Some(self.dir),
            "class" => Some(self.class),
            "code" => Some(self.code),
            "stem" => Some(self.stem),
            _ => None,
        }
    }

    /// Expand every known placeholder in `template`
    pub fn expand(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match tail.find('}') {
                Some(end) => match self.lookup(&tail[1..end]) {
                    Some(value) => {
                        out.push_str(value);
                        rest = &tail[end + 1..];
                    }
                    None => {
                        out.push('{');
                        rest = &tail[1..];
                    }
                },
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Where the submitted code goes before execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourceLayout {
    /// `temp_<token>.<ext>`
    #[default]
    Generic,
    /// `<Class>.java`, named after the declared class
    JavaClass,
    /// Nothing is written; the code is substituted for `{code}`
    Inline,
}

/// Toolchain hint: when a failure message contains `token`, `message` is appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub token: String,
    pub message: String,
}

impl Hint {
    /// Append the hint if `text` mentions the token
    pub fn apply(&self, text: &mut String) {
        if !self.token.is_empty() && text.contains(&self.token) {
            text.push_str("\n\n");
            text.push_str(&self.message);
        }
    }
}

/// File extension without dot (e.g., "py")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/', '\\' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    pub command: Vec<String>,

    /// Name of the produced artifact, relative to the workspace
    /// (e.g. "{stem}" or "{class}.class")
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    pub command: Vec<String>,

    /// Environment Variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,
}
