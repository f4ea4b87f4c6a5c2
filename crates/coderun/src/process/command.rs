//! Command builder for a single pipeline step
//!
//! Steps are argument vectors, never shell strings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::types::Stage;

/// Builder for one compile or run invocation
#[derive(Debug, Clone)]
pub struct StepCommand {
    /// Program followed by its arguments
    argv: Vec<String>,
    /// Which pipeline step this is
    stage: Stage,
    /// Working directory for the child
    working_dir: Option<PathBuf>,
    /// Extra environment variables
    env: HashMap<String, String>,
    /// File attached as standard input
    stdin: Option<PathBuf>,
}

impl StepCommand {
    /// Create a new step from an argument vector
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stage: Stage::Run,
            working_dir: None,
            env: HashMap::new(),
            stdin: None,
        }
    }

    /// Set the pipeline stage
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Redirect a file into the child's standard input
    pub fn stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Replace the program, keeping the arguments
    pub fn set_program(&mut self, program: impl Into<String>) {
        match self.argv.first_mut() {
            Some(first) => *first = program.into(),
            None => self.argv.push(program.into()),
        }
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn get_stage(&self) -> Stage {
        self.stage
    }

    pub fn stdin_path(&self) -> Option<&Path> {
        self.stdin.as_deref()
    }

    pub fn get_env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Build the tokio command.
    ///
    /// stdout and stderr are piped, stdin is the configured file or null. On
    /// unix the child leads a new process group so the whole tree can be
    /// killed at once.
    pub fn build(&self) -> std::io::Result<Command> {
        let program = self.program().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
        })?;

        let stdin = match self.stdin {
            Some(ref path) => Stdio::from(std::fs::File::open(path)?),
            None => Stdio::null(),
        };

        let mut command = Command::new(program);
        command
            .args(&self.argv[1..])
            .envs(&self.env)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        #[cfg(unix)]
        command.process_group(0);

        Ok(command)
    }
}
