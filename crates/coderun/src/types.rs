use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock time limit in seconds, shared by the compile and run steps
    #[serde(default)]
    pub wall_time_limit: Option<f64>,

    /// Maximum captured output (stdout + stderr) in kilobytes
    #[serde(default)]
    pub max_output: Option<u64>,
}

impl ResourceLimits {
    /// 1 megabyte in kilobytes
    pub const MB: u64 = 1024;

    /// Create new resource limits with the default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits with every field unset, used as an override base
    pub fn unset() -> Self {
        Self {
            wall_time_limit: None,
            max_output: None,
        }
    }

    /// Set the wall clock time limit in seconds
    pub fn with_wall_time_limit(mut self, seconds: f64) -> Self {
        self.wall_time_limit = Some(seconds);
        self
    }

    /// Set the maximum output size in kilobytes
    pub fn with_max_output(mut self, kb: u64) -> Self {
        self.max_output = Some(kb);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            wall_time_limit: overrides.wall_time_limit.or(self.wall_time_limit),
            max_output: overrides.max_output.or(self.max_output),
        }
    }

    /// Wall clock budget as a duration (falls back to the default 10s)
    pub fn timeout(&self) -> Duration {
        let seconds = self
            .wall_time_limit
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(DEFAULT_WALL_TIME_LIMIT);
        Duration::from_secs_f64(seconds)
    }

    /// Output cap in bytes (falls back to the default 1 MB)
    pub fn max_output_bytes(&self) -> usize {
        let kb = self.max_output.unwrap_or(DEFAULT_MAX_OUTPUT);
        usize::try_from(kb.saturating_mul(1024)).unwrap_or(usize::MAX)
    }
}

const DEFAULT_WALL_TIME_LIMIT: f64 = 10.0;
const DEFAULT_MAX_OUTPUT: u64 = ResourceLimits::MB;

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            wall_time_limit: Some(DEFAULT_WALL_TIME_LIMIT),
            max_output: Some(DEFAULT_MAX_OUTPUT),
        }
    }
}

/// A request to execute code, as accepted by the HTTP façade
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source code (or the shell command line for `terminal`)
    #[serde(default)]
    pub code: String,

    /// Language ID (e.g. "python", "java")
    #[serde(default)]
    pub language: String,

    /// Optional standard input for the program
    #[serde(default)]
    pub input: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            input: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// The only externally visible result shape.
///
/// `error` being set means the code failed to build or run. `output` is
/// independent and may hold partial output produced before a crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub output: String,
    pub error: Option<String>,
}

impl ExecutionResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Which step of the pipeline produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    Compile,
    #[default]
    Run,
}

/// Raw result of running one step. Never sent to callers as is; see
/// [`crate::runner::normalize`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    /// Captured standard output
    pub stdout: Vec<u8>,

    /// Captured standard error
    pub stderr: Vec<u8>,

    /// Exit code if the process exited normally
    pub exit_code: Option<i32>,

    /// Signal number if the process was killed by a signal
    pub signal: Option<i32>,

    /// Whether the wall clock limit expired
    pub timed_out: bool,

    /// The process could not be started at all
    pub spawn_error: Option<String>,

    /// Output exceeded the cap and was cut
    pub truncated: bool,

    /// Wall clock time spent in the step
    pub wall_time: Duration,

    /// Step that produced this outcome
    pub stage: Stage,

    /// Time limit that applied, used for the timeout message
    pub time_limit: Duration,
}

impl ExecutionOutcome {
    /// Outcome for a step that could not be started
    pub fn spawn_failed(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            stage,
            ..Default::default()
        }
    }

    /// Classify the outcome
    pub fn status(&self) -> ExecutionStatus {
        if self.spawn_error.is_some() {
            ExecutionStatus::SpawnFailed
        } else if self.timed_out {
            ExecutionStatus::TimedOut
        } else if self.signal.is_some() {
            ExecutionStatus::Signaled
        } else if self.exit_code == Some(0) {
            ExecutionStatus::Ok
        } else {
            ExecutionStatus::RuntimeError
        }
    }

    /// Check if the step was successful (exited with code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status(), ExecutionStatus::Ok)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Process exited with code 0
    Ok,

    /// Non-zero exit code
    RuntimeError,

    /// Wall clock limit exceeded
    TimedOut,

    /// Process was killed by a signal
    Signaled,

    /// Process could not be spawned
    SpawnFailed,
}
