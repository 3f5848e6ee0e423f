use anyhow::{bail, Result};
use kiln_build::{
    BepBuildResultHelper, CommandOutput, CommandRunner, HelperOptions, Label, OutputArtifact,
};
use kiln_process::RunOptions;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

mod lifecycle;
mod properties;
mod registry;

pub fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name)
}

pub fn read_testdata(name: &str) -> String {
    std::fs::read_to_string(testdata(name)).expect("testdata should be readable")
}

pub fn label(s: &str) -> Label {
    Label::parse(s).expect("valid label")
}

pub fn paths(artifacts: &[OutputArtifact]) -> Vec<&str> {
    artifacts.iter().map(OutputArtifact::relative_path).collect()
}

/// A helper whose event file already holds `stream`, with the build marked finished.
pub fn finished_helper(dir: &Path, stream: &str) -> BepBuildResultHelper {
    let path = dir.join("events.json");
    std::fs::write(&path, stream).expect("write event file");
    let mut helper = BepBuildResultHelper::for_event_file(path, &HelperOptions::default());
    kiln_build::BuildResultHelper::build_finished(&mut helper);
    helper
}

/// Stands in for `bazel`: records every invocation and writes a canned event stream to the file
/// named by `--build_event_json_file`.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    timeouts: Arc<Mutex<Vec<Option<Duration>>>>,
    stream: Option<String>,
    output: CommandOutput,
    spawn_error: bool,
}

impl RecordingRunner {
    pub fn writing(stream: impl Into<String>) -> Self {
        Self {
            stream: Some(stream.into()),
            output: CommandOutput {
                exit_code: Some(0),
                ..CommandOutput::default()
            },
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: CommandOutput) -> Self {
        self.output = output;
        self
    }

    pub fn failing_to_spawn() -> Self {
        Self {
            spawn_error: true,
            ..Self::default()
        }
    }

    pub fn last_call(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .last()
            .cloned()
            .expect("missing command invocation")
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        *self
            .timeouts
            .lock()
            .expect("timeouts mutex poisoned")
            .last()
            .expect("missing timeout capture")
    }
}

impl CommandRunner for RecordingRunner {
    fn run_with_options(
        &self,
        _cwd: &Path,
        program: &str,
        args: &[&str],
        opts: RunOptions,
    ) -> Result<CommandOutput> {
        assert_eq!(program, "bazel");
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(args.iter().map(|s| s.to_string()).collect());
        self.timeouts
            .lock()
            .expect("timeouts mutex poisoned")
            .push(opts.timeout);

        if self.spawn_error {
            bail!("failed to spawn `bazel`: No such file or directory");
        }

        if let Some(stream) = &self.stream {
            let path = args
                .iter()
                .find_map(|arg| arg.strip_prefix("--build_event_json_file="))
                .expect("build event file flag");
            std::fs::write(path, stream)?;
        }
        Ok(self.output.clone())
    }
}
