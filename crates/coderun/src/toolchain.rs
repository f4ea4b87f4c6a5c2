//! Toolchain discovery
//!
//! Finds external compilers and runtimes. A tool is probed through the PATH
//! first; when that fails, each configured search directory and then each
//! built-in platform location is probed in turn.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::ToolchainConfig;

/// Time allowed for a single probe invocation
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("{tool} not found (searched PATH and {searched} known locations)")]
    NotFound { tool: String, searched: usize },
}

/// Locates toolchain binaries
#[derive(Debug, Clone, Default)]
pub struct ToolchainLocator {
    toolchains: HashMap<String, ToolchainConfig>,
}

impl ToolchainLocator {
    pub fn new(toolchains: HashMap<String, ToolchainConfig>) -> Self {
        Self { toolchains }
    }

    /// Whether `tool` is a registered toolchain
    pub fn manages(&self, tool: &str) -> bool {
        self.toolchains.contains_key(tool)
    }

    /// Every location probed for `tool` after the PATH, in order
    pub fn candidates(&self, tool: &str) -> Vec<PathBuf> {
        let configured = self
            .toolchains
            .get(tool)
            .map(|t| t.search_dirs.as_slice())
            .unwrap_or_default();

        let mut dirs: Vec<PathBuf> = configured.to_vec();
        for dir in platform_search_dirs(tool) {
            let dir = PathBuf::from(dir);
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }

        dirs.into_iter()
            .map(|dir| dir.join(executable_name(tool)))
            .collect()
    }

    /// Resolve `tool` to something that can be spawned.
    ///
    /// Returns the bare name when the PATH probe succeeds, otherwise the first
    /// candidate path whose probe succeeds.
    #[instrument(skip(self))]
    pub async fn locate(&self, tool: &str) -> Result<PathBuf, ToolchainError> {
        let version_args = self
            .toolchains
            .get(tool)
            .map(|t| t.version_args.as_slice())
            .unwrap_or_default();

        if probe(Path::new(tool), version_args).await {
            debug!(tool, "found on PATH");
            return Ok(PathBuf::from(tool));
        }

        let candidates = self.candidates(tool);
        for candidate in &candidates {
            if !candidate.is_file() {
                continue;
            }
            if probe(candidate, version_args).await {
                debug!(tool, path = %candidate.display(), "found in fallback location");
                return Ok(candidate.clone());
            }
        }

        Err(ToolchainError::NotFound {
            tool: tool.to_owned(),
            searched: candidates.len(),
        })
    }
}

/// Run `program version_args...` and report whether it exited successfully
async fn probe(program: &Path, version_args: &[String]) -> bool {
    let child = Command::new(program)
        .args(version_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let Ok(mut child) = child else {
        return false;
    };

    match tokio::time::timeout(PROBE_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(_)) => false,
        Err(_) => {
            let _ = child.kill().await;
            false
        }
    }
}

fn executable_name(tool: &str) -> String {
    if cfg!(windows) && !tool.ends_with(".exe") {
        format!("{tool}.exe")
    } else {
        tool.to_owned()
    }
}

/// Well-known install locations that are not usually on the PATH
#[cfg(windows)]
fn platform_search_dirs(tool: &str) -> &'static [&'static str] {
    match tool {
        "javac" | "java" => &[
            r"C:\Program Files\Java\jdk-25\bin",
            r"C:\Program Files\Java\jdk-24\bin",
            r"C:\Program Files\Java\jdk-23\bin",
            r"C:\Program Files\Java\jdk-22\bin",
            r"C:\Program Files\Java\jdk-21\bin",
            r"C:\Program Files\Java\jdk-20\bin",
            r"C:\Program Files\Java\jdk-19\bin",
            r"C:\Program Files\Java\jdk-18\bin",
            r"C:\Program Files\Java\jdk-17\bin",
            r"C:\Program Files\Java\jdk-11\bin",
            r"C:\Program Files (x86)\Java\jdk-17\bin",
            r"C:\Program Files (x86)\Java\jdk-11\bin",
        ],
        "gcc" => &[r"C:\msys64\mingw64\bin", r"C:\MinGW\bin"],
        "csc" => &[r"C:\Windows\Microsoft.NET\Framework64\v4.0.30319"],
        _ => &[],
    }
}

/// Well-known install locations that are not usually on the PATH
#[cfg(not(windows))]
fn platform_search_dirs(tool: &str) -> &'static [&'static str] {
    match tool {
        "javac" | "java" => &[
            "/usr/lib/jvm/default-java/bin",
            "/usr/lib/jvm/java-21-openjdk-amd64/bin",
            "/usr/lib/jvm/java-17-openjdk-amd64/bin",
            "/usr/lib/jvm/java-11-openjdk-amd64/bin",
            "/usr/lib/jvm/java-21-openjdk/bin",
            "/usr/lib/jvm/java-17-openjdk/bin",
            "/opt/java/openjdk/bin",
            "/opt/homebrew/opt/openjdk/bin",
            "/usr/local/opt/openjdk/bin",
        ],
        "gcc" => &["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"],
        "csc" => &[
            "/usr/bin",
            "/usr/local/bin",
            "/Library/Frameworks/Mono.framework/Versions/Current/Commands",
        ],
        _ => &[],
    }
}
