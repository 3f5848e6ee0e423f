use anyhow::{Context, Result};
use kiln_process::{CommandSpec, RunOptions};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub truncated: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.cancelled
    }
}

/// Runs external commands on behalf of the build invoker.
///
/// A non-zero exit is not an error here: a failed build still writes its event stream.
pub trait CommandRunner: Send + Sync {
    fn run_with_options(
        &self,
        cwd: &Path,
        program: &str,
        args: &[&str],
        opts: RunOptions,
    ) -> Result<CommandOutput>;

    fn run(&self, cwd: &Path, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.run_with_options(cwd, program, args, RunOptions::default())
    }
}

#[derive(Debug, Default, Clone)]
pub struct DefaultCommandRunner;

impl CommandRunner for DefaultCommandRunner {
    fn run_with_options(
        &self,
        cwd: &Path,
        program: &str,
        args: &[&str],
        opts: RunOptions,
    ) -> Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let spec = CommandSpec::new(cwd, Path::new(program), &args);
        let result = kiln_process::run_command_spec(&spec, opts)
            .with_context(|| format!("failed to spawn `{spec}`"))?;

        if result.output.truncated {
            tracing::debug!(
                target = "kiln.build",
                command = %spec,
                "command output was truncated"
            );
        }

        Ok(CommandOutput {
            exit_code: result.exit_code(),
            timed_out: result.timed_out,
            cancelled: result.cancelled,
            truncated: result.output.truncated,
            stdout: result.output.stdout,
            stderr: result.output.stderr,
        })
    }
}
