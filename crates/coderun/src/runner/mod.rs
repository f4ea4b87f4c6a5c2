//! Request orchestration
//!
//! Validates a request, lays out its workspace, runs the compile and run
//! steps under one shared deadline, and always cleans up afterwards.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument};

pub use crate::runner::normalize::{NO_OUTPUT, TRUNCATED_MARKER, normalize};
pub use crate::runner::plan::ExecutionPlan;

mod normalize;
mod plan;

use crate::{
    config::{Config, Language, SourceLayout},
    process::{self, RunOptions},
    toolchain::ToolchainLocator,
    types::{ExecutionOutcome, ExecutionRequest, ExecutionResponse, ResourceLimits},
    workspace::{Scratch, Workspace, WorkspaceError, java_class_name},
};

/// Error text returned when the service itself failed, not the program
pub const ENGINE_FAULT: &str = "Internal error while preparing the execution. Please try again.";

/// Problems with the request itself, reported to the caller as a bad request
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Code and language are required")]
    MissingFields,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Language '{0}' is disabled on this server")]
    LanguageDisabled(String),

    #[error(
        "Could not find a class declaration in Java code. Please ensure your code contains a class definition."
    )]
    MissingClassDeclaration,
}

/// Executes requests against a configured language table
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
    scratch: Scratch,
    locator: ToolchainLocator,
    permits: Option<Arc<Semaphore>>,
}

impl Runner {
    /// Create a runner, making sure the scratch directory exists
    pub async fn prepare(config: Config) -> Result<Self, WorkspaceError> {
        let scratch = Scratch::prepare(&config.scratch_dir).await?;
        let locator = ToolchainLocator::new(config.toolchains.clone());
        let permits = config
            .max_concurrent_executions
            .map(|n| Arc::new(Semaphore::new(n)));

        Ok(Self {
            config: Arc::new(config),
            scratch,
            locator,
            permits,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the scratch root
    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// Look up a language the server is willing to run
    pub fn resolve(&self, id: &str) -> Result<&Language, RequestError> {
        let language = self
            .config
            .get_language(id)
            .map_err(|_| RequestError::UnsupportedLanguage(id.to_owned()))?;
        if language.privileged && !self.config.allow_privileged {
            return Err(RequestError::LanguageDisabled(id.to_owned()));
        }
        Ok(language)
    }

    /// Execute one request.
    ///
    /// Only request validation errors are returned as `Err`. Compile errors,
    /// runtime errors, timeouts, missing toolchains, and internal faults all
    /// come back as a response with `error` set.
    #[instrument(skip_all, fields(language = %request.language))]
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResponse, RequestError> {
        if request.code.is_empty() || request.language.is_empty() {
            return Err(RequestError::MissingFields);
        }
        let language = self.resolve(&request.language)?;
        let class = match language.source {
            SourceLayout::JavaClass => Some(
                java_class_name(&request.code).ok_or(RequestError::MissingClassDeclaration)?,
            ),
            _ => None,
        };

        // The semaphore is never closed, so acquiring cannot fail
        let _permit = match self.permits {
            Some(ref permits) => permits.clone().acquire_owned().await.ok(),
            None => None,
        };

        let started = Instant::now();
        let limits = self.config.effective_limits(language.limits.as_ref());

        let mut workspace = match Workspace::create(&self.scratch).await {
            Ok(workspace) => workspace,
            Err(e) => {
                error!(error = %e, "failed to create workspace");
                return Ok(ExecutionResponse::failure("", ENGINE_FAULT));
            }
        };

        let result = self
            .run_in(&mut workspace, language, request, class, &limits)
            .await;
        workspace.cleanup().await;

        let response = match result {
            Ok(outcome) => {
                info!(
                    token = workspace.token(),
                    status = ?outcome.status(),
                    stage = ?outcome.stage,
                    elapsed = ?started.elapsed(),
                    "execution finished"
                );
                normalize(&outcome, language)
            }
            Err(e) => {
                error!(token = workspace.token(), error = %e, "failed to prepare workspace files");
                ExecutionResponse::failure("", ENGINE_FAULT)
            }
        };

        Ok(response)
    }

    async fn run_in(
        &self,
        workspace: &mut Workspace,
        language: &Language,
        request: &ExecutionRequest,
        class: Option<&str>,
        limits: &ResourceLimits,
    ) -> Result<ExecutionOutcome, WorkspaceError> {
        let mut plan = plan::build(
            language,
            workspace,
            &request.code,
            class,
            request.input.as_deref(),
        )
        .await?;

        let budget = limits.timeout();
        let deadline = Instant::now() + budget;
        let max_output = limits.max_output_bytes();
        let timed_out = |stage| ExecutionOutcome {
            timed_out: true,
            stage,
            time_limit: budget,
            ..Default::default()
        };

        // Probing counts against the request's time limit
        for step in plan.steps_mut() {
            let Some(program) = step.program().map(str::to_owned) else {
                continue;
            };
            if !self.locator.manages(&program) {
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.locator.locate(&program)).await {
                Ok(Ok(path)) => step.set_program(path.to_string_lossy()),
                Ok(Err(e)) => {
                    debug!(error = %e, "toolchain unavailable");
                    let mut outcome = ExecutionOutcome::spawn_failed(step.get_stage(), e.to_string());
                    outcome.time_limit = budget;
                    return Ok(outcome);
                }
                Err(_) => {
                    debug!(tool = %program, "time limit reached while locating toolchain");
                    return Ok(timed_out(step.get_stage()));
                }
            }
        }

        let mut compile_stderr = Vec::new();
        if let Some(ref compile) = plan.compile {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(timed_out(compile.get_stage()));
            }
            let mut outcome = process::run(compile, RunOptions::new(remaining, max_output)).await;
            outcome.time_limit = budget;
            if !outcome.is_success() {
                return Ok(outcome);
            }
            compile_stderr = outcome.stderr;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(timed_out(plan.run.get_stage()));
        }

        let mut outcome = process::run(&plan.run, RunOptions::new(remaining, max_output)).await;
        outcome.time_limit = budget;
        // Compiler warnings only matter when the program then fails
        if !outcome.is_success() && !compile_stderr.is_empty() {
            compile_stderr.append(&mut outcome.stderr);
            outcome.stderr = compile_stderr;
        }
        Ok(outcome)
    }
}
