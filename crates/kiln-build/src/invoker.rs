use crate::{BuildResultHelper, CommandRunner};
use anyhow::Result;
use kiln_bep::BuildStatus;
use kiln_core::Label;
use kiln_process::{CancellationToken, RunOptions};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// What to build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    /// Target patterns (`//pkg:t`, `//pkg/...`, `//pkg:all`), passed to Bazel as given.
    pub targets: Vec<String>,
    /// Caller flags, placed before the helper's flags.
    pub flags: Vec<String>,
    /// Requested via `--output_groups`; Bazel's defaults when empty.
    pub output_groups: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub timeout: Option<Duration>,
    pub max_bytes: usize,
    pub cancellation: Option<CancellationToken>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_bytes: RunOptions::default().max_bytes,
            cancellation: None,
        }
    }
}

/// How the build process ended. Artifacts are read from the helper afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub exit_code: Option<i32>,
    pub status: BuildStatus,
    pub timed_out: bool,
    pub cancelled: bool,
    pub stderr: String,
}

impl BuildRequest {
    /// Request for explicit labels, in their canonical form.
    pub fn for_labels<'a>(labels: impl IntoIterator<Item = &'a Label>) -> Self {
        Self {
            targets: labels.into_iter().map(Label::to_string).collect(),
            ..Self::default()
        }
    }
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        self.status == BuildStatus::Success
    }
}

/// Runs `bazel build` with a [`BuildResultHelper`] attached.
#[derive(Debug)]
pub struct BuildInvoker<R> {
    workspace_root: PathBuf,
    program: String,
    runner: R,
}

impl<R: CommandRunner> BuildInvoker<R> {
    pub fn new(workspace_root: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            program: "bazel".to_string(),
            runner,
        }
    }

    /// Use another client binary, e.g. `bazelisk`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `build`, default UI flags, caller flags, helper flags, `--output_groups`, targets.
    pub fn command_line(
        &self,
        request: &BuildRequest,
        helper: &dyn BuildResultHelper,
    ) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        args.extend(default_ui_flags(&request.flags));
        args.extend(request.flags.iter().cloned());
        args.extend(helper.build_flags());
        if !request.output_groups.is_empty() {
            args.push(format!("--output_groups={}", request.output_groups.join(",")));
        }
        args.extend(request.targets.iter().cloned());
        args
    }

    /// Runs the build and then tells `helper` it finished, whatever the outcome.
    ///
    /// Errors only when the build process could not be run at all.
    pub fn build(
        &self,
        request: &BuildRequest,
        helper: &mut dyn BuildResultHelper,
        options: BuildOptions,
    ) -> Result<BuildOutcome> {
        let args = self.command_line(request, helper);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let opts = RunOptions {
            timeout: options.timeout,
            max_bytes: options.max_bytes,
            cancellation: options.cancellation,
            ..RunOptions::default()
        };

        tracing::info!(
            target = "kiln.build",
            program = %self.program,
            targets = request.targets.len(),
            "starting build"
        );
        let output = self
            .runner
            .run_with_options(&self.workspace_root, &self.program, &args, opts);
        helper.build_finished();
        let output = output?;

        let status = if output.timed_out || output.cancelled {
            BuildStatus::Cancelled
        } else {
            output
                .exit_code
                .map(BuildStatus::from_exit_code)
                .unwrap_or(BuildStatus::FatalError)
        };
        tracing::info!(
            target = "kiln.build",
            exit_code = ?output.exit_code,
            status = ?status,
            timed_out = output.timed_out,
            cancelled = output.cancelled,
            "build finished"
        );

        Ok(BuildOutcome {
            exit_code: output.exit_code,
            status,
            timed_out: output.timed_out,
            cancelled: output.cancelled,
            stderr: output.stderr,
        })
    }
}

/// Plain, non-interactive output unless the caller asked otherwise.
fn default_ui_flags(flags: &[String]) -> Vec<String> {
    let mentions = |names: &[&str]| {
        flags.iter().any(|flag| {
            names
                .iter()
                .any(|name| flag == name || flag.starts_with(&format!("{name}=")))
        })
    };

    let mut out = Vec::new();
    if !mentions(&["--color"]) {
        out.push("--color=no".to_string());
    }
    if !mentions(&["--curses"]) {
        out.push("--curses=no".to_string());
    }
    if !mentions(&["--show_progress", "--noshow_progress"]) {
        out.push("--noshow_progress".to_string());
    }
    out
}
