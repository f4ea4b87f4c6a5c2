//! Conversion of raw step outcomes into the uniform response shape

use crate::config::Language;
use crate::types::{ExecutionOutcome, ExecutionResponse, ExecutionStatus, Stage};

/// Output reported when a successful program printed nothing
pub const NO_OUTPUT: &str = "Code executed successfully (no output)";

/// Marker appended when output hit the size cap
pub const TRUNCATED_MARKER: &str = "\n[output truncated]";

/// Build the caller-facing response for an outcome. Never fails.
pub fn normalize(outcome: &ExecutionOutcome, language: &Language) -> ExecutionResponse {
    let stdout = outcome.stdout_lossy();
    let stderr = outcome.stderr_lossy();

    let (output, mut error) = match outcome.status() {
        ExecutionStatus::Ok => {
            let mut output = if !stdout.is_empty() {
                stdout
            } else if !stderr.is_empty() {
                stderr
            } else {
                NO_OUTPUT.to_owned()
            };
            if outcome.truncated {
                output.push_str(TRUNCATED_MARKER);
            }
            return ExecutionResponse::success(output);
        }
        ExecutionStatus::SpawnFailed => {
            let message = outcome.spawn_error.clone().unwrap_or_default();
            (String::new(), with_stderr(message, &stderr))
        }
        ExecutionStatus::TimedOut => {
            let step = match outcome.stage {
                Stage::Compile => "Compilation",
                Stage::Run => "Execution",
            };
            let message = format!(
                "Time limit exceeded: {step} did not finish within {:?}",
                outcome.time_limit
            );
            (String::new(), with_stderr(message, &stderr))
        }
        ExecutionStatus::RuntimeError | ExecutionStatus::Signaled => match outcome.stage {
            // Compilers report diagnostics on either stream; their stdout is
            // not program output
            Stage::Compile => {
                let message = first_non_blank([stderr, stdout]).unwrap_or_else(|| exit_message(outcome));
                (String::new(), message)
            }
            Stage::Run => {
                let message = first_non_blank([stderr]).unwrap_or_else(|| exit_message(outcome));
                (stdout, message)
            }
        },
    };

    if language.compact_diagnostics {
        error = compact(&error);
    }
    if let Some(ref hint) = language.hint {
        hint.apply(&mut error);
    }
    if outcome.truncated {
        error.push_str(TRUNCATED_MARKER);
    }

    ExecutionResponse::failure(output, error)
}

/// Drop blank lines, which compilers emit generously
pub fn compact(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn with_stderr(mut message: String, stderr: &str) -> String {
    if !stderr.trim().is_empty() {
        message.push('\n');
        message.push_str(stderr);
    }
    message
}

fn first_non_blank<const N: usize>(candidates: [String; N]) -> Option<String> {
    candidates.into_iter().find(|s| !s.trim().is_empty())
}

fn exit_message(outcome: &ExecutionOutcome) -> String {
    match (outcome.signal, outcome.exit_code) {
        (Some(signal), _) => format!("Process terminated by signal {signal}"),
        (None, Some(code)) => format!("Process exited with code {code}"),
        (None, None) => "Process failed".to_owned(),
    }
}
