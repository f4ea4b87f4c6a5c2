//! Turning a language recipe into concrete steps

use crate::config::{Language, Placeholders};
use crate::process::StepCommand;
use crate::types::Stage;
use crate::workspace::{Workspace, WorkspaceError};

/// The steps for one request: an optional compile step, then the run step
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub compile: Option<StepCommand>,
    pub run: StepCommand,
}

impl ExecutionPlan {
    /// Steps in execution order
    pub fn steps_mut(&mut self) -> impl Iterator<Item = &mut StepCommand> {
        self.compile.iter_mut().chain(std::iter::once(&mut self.run))
    }
}

/// Write the request's files into `workspace` and build its steps.
///
/// The compile output is registered with the workspace before anything runs
/// so it is removed even if compilation is killed half way.
pub async fn build(
    language: &Language,
    workspace: &mut Workspace,
    code: &str,
    class: Option<&str>,
    input: Option<&str>,
) -> Result<ExecutionPlan, WorkspaceError> {
    let source = workspace.materialize(language, code, class).await?;
    let stdin = match input {
        Some(input) => workspace.materialize_stdin(input).await?,
        None => None,
    };

    let stem = workspace.stem();
    let class = class.unwrap_or_default();
    let binary = match language.compile {
        Some(ref compile) => {
            let names = Placeholders {
                stem: &stem,
                class,
                ..Default::default()
            };
            let name = names.expand(&compile.output_name);
            workspace.register(&name)?.to_string_lossy().into_owned()
        }
        None => String::new(),
    };

    let dir = workspace.dir().to_path_buf();
    let dir_str = dir.to_string_lossy();
    let source = source
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_default();
    let values = Placeholders {
        source: &source,
        binary: &binary,
        dir: &dir_str,
        class,
        code,
        stem: &stem,
    };

    let compile = language.compile.as_ref().map(|compile| {
        StepCommand::new(Language::expand_command(&compile.command, &values))
            .stage(Stage::Compile)
            .working_dir(&dir)
            .envs(compile.env.clone())
    });

    let mut run = StepCommand::new(Language::expand_command(&language.run.command, &values))
        .stage(Stage::Run)
        .working_dir(&dir)
        .envs(language.run.env.clone());
    if let Some(stdin) = stdin {
        run = run.stdin(stdin);
    }

    Ok(ExecutionPlan { compile, run })
}
