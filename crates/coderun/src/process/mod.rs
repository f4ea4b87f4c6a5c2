//! Sub-process execution
//!
//! Runs one pipeline step with a wall clock limit and an output cap, and
//! reports what happened without judging it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument, warn};

pub use crate::process::command::StepCommand;
use crate::types::{ExecutionOutcome, ResourceLimits};

mod command;

const READ_CHUNK: usize = 8 * 1024;

/// Limits applied to one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Wall clock budget for the step
    pub timeout: Duration,
    /// Combined stdout + stderr bytes kept
    pub max_output: usize,
}

impl RunOptions {
    pub fn new(timeout: Duration, max_output: usize) -> Self {
        Self {
            timeout,
            max_output,
        }
    }
}

impl From<&ResourceLimits> for RunOptions {
    fn from(limits: &ResourceLimits) -> Self {
        Self::new(limits.timeout(), limits.max_output_bytes())
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&ResourceLimits::default())
    }
}

/// Run a step to completion, timeout, or spawn failure
#[instrument(skip_all, fields(program = step.program(), stage = ?step.get_stage()))]
pub async fn run(step: &StepCommand, options: RunOptions) -> ExecutionOutcome {
    let start = Instant::now();
    let mut outcome = ExecutionOutcome {
        stage: step.get_stage(),
        time_limit: options.timeout,
        ..Default::default()
    };

    let program = step.program().unwrap_or_default().to_owned();
    let spawned = step.build().and_then(|mut command| command.spawn());
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            debug!(error = %e, "spawn failed");
            outcome.spawn_error = Some(format!("failed to start '{program}': {e}"));
            return outcome;
        }
    };

    let pid = child.id();
    debug!(?pid, argv = ?step.argv(), "process started");
    // Declared after `child` so it drops first when the future is cancelled
    let group = GroupGuard(pid);

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let budget = AtomicUsize::new(options.max_output);
    let truncated = AtomicBool::new(false);

    let finished = {
        let collect = async {
            tokio::join!(
                drain(stdout, &mut outcome.stdout, &budget, &truncated),
                drain(stderr, &mut outcome.stderr, &budget, &truncated),
                child.wait(),
            )
        };
        tokio::time::timeout(options.timeout, collect).await
    };

    match finished {
        Ok((out, err, status)) => {
            for read in [out, err] {
                if let Err(e) = read {
                    warn!(error = %e, "failed reading child output");
                }
            }
            match status {
                Ok(status) => {
                    outcome.exit_code = status.code();
                    outcome.signal = exit_signal(&status);
                }
                Err(e) => {
                    outcome.spawn_error = Some(format!("failed to wait for '{program}': {e}"));
                }
            }
        }
        Err(_) => {
            outcome.timed_out = true;
            debug!(?pid, "time limit exceeded, killing process group");
            group.kill();
            let _ = child.start_kill();
            if let Ok(status) = child.wait().await {
                outcome.signal = exit_signal(&status);
            }
        }
    }

    // Background children outliving the step are killed too
    drop(group);

    outcome.truncated = truncated.load(Ordering::Relaxed);
    outcome.wall_time = start.elapsed();

    debug!(
        status = ?outcome.status(),
        exit_code = ?outcome.exit_code,
        signal = ?outcome.signal,
        truncated = outcome.truncated,
        wall_time = ?outcome.wall_time,
        "step complete"
    );

    outcome
}

/// Kills the step's whole process group when dropped, including when the
/// owning future is cancelled before the step finishes
struct GroupGuard(Option<u32>);

impl GroupGuard {
    fn kill(&self) {
        kill_process_group(self.0);
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Read a pipe to EOF, keeping only what fits in the shared budget
async fn drain<R>(
    reader: Option<R>,
    buf: &mut Vec<u8>,
    budget: &AtomicUsize,
    truncated: &AtomicBool,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let keep = claim(budget, n);
        buf.extend_from_slice(&chunk[..keep]);
        if keep < n {
            truncated.store(true, Ordering::Relaxed);
        }
    }
}

/// Take up to `want` bytes from the budget, returning how many were granted
fn claim(budget: &AtomicUsize, want: usize) -> usize {
    budget
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| {
            Some(left.saturating_sub(want))
        })
        .map(|left| left.min(want))
        .unwrap_or(0)
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// SIGKILL every process in the child's group
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    // The child was spawned with process_group(0), so its pid is the group id.
    unsafe {
        let _ = libc::kill(-pid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
