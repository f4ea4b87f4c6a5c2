//! A library for time-bounded remote code execution.
//!
//! coderun takes a snippet of source code, a language ID, and optional
//! standard input, then writes the code into a private workspace, compiles it
//! if the language needs it, runs it under a wall clock limit, and returns
//! the captured output in a uniform shape.
//!
//! # Features
//!
//! - **Table-driven languages**: compile and run recipes live in TOML.
//! - **Per-request workspaces**: concurrent requests never share files.
//! - **Process-group kills**: timeouts take down every process a program spawned.
//! - **Toolchain discovery**: compilers outside the PATH are found in known install locations.
//!
//! Programs run with the privileges of the service. There is no sandbox.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use runner::{ENGINE_FAULT, NO_OUTPUT, RequestError, Runner};
pub use toolchain::{ToolchainError, ToolchainLocator};
pub use types::{
    ExecutionOutcome, ExecutionRequest, ExecutionResponse, ExecutionStatus, ResourceLimits, Stage,
};
pub use workspace::{Scratch, Workspace, WorkspaceError};

pub mod config;
pub mod process;
pub mod runner;
pub mod toolchain;
pub mod types;
pub mod workspace;
