use crate::{
    ArtifactResolutionFailure, BuildResultHelper, OutputArtifact, OutputGroupArtifacts,
};
use kiln_bep::{parse_build_event_file, BuildResult, ParseOptions, ParsedBuildOutput};
use kiln_core::Label;
use std::{
    io,
    path::{Path, PathBuf},
};
use tempfile::TempPath;

/// Settings shared by every helper a session creates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelperOptions {
    /// Directory for event files; the system temp dir when unset.
    pub bep_dir: Option<PathBuf>,
    /// Appended after the event-file flags.
    pub extra_flags: Vec<String>,
    pub parse: ParseOptions,
}

/// Observable phase of a [`BepBuildResultHelper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The build has not finished yet.
    Pending,
    /// The event stream was read; the next extraction returns its result.
    Resolved,
    /// An extraction already took the result.
    Consumed,
}

#[derive(Debug)]
enum State {
    Pending,
    Resolved(Result<ParsedBuildOutput, ArtifactResolutionFailure>),
    Consumed,
}

/// [`BuildResultHelper`] backed by Bazel's `--build_event_json_file` output.
#[derive(Debug)]
pub struct BepBuildResultHelper {
    event_file: PathBuf,
    /// Present when the helper created the event file and must delete it.
    owned: Option<TempPath>,
    extra_flags: Vec<String>,
    parse: ParseOptions,
    state: State,
    result: Option<BuildResult>,
    failed_targets: Vec<Label>,
    closed: bool,
}

impl BepBuildResultHelper {
    /// Helper with a fresh event file in `options.bep_dir`.
    ///
    /// The file is created empty so a build that dies before writing anything reads as a
    /// truncated stream rather than a missing one.
    pub fn new(options: &HelperOptions) -> io::Result<Self> {
        let dir = options.bep_dir.clone().unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&dir)?;
        let temp = tempfile::Builder::new()
            .prefix("kiln-bep-")
            .suffix(".json")
            .tempfile_in(&dir)?
            .into_temp_path();

        Ok(Self::with_event_file(temp.to_path_buf(), Some(temp), options))
    }

    /// Helper reading an event file the caller manages. [`BuildResultHelper::close`] leaves the
    /// file in place.
    pub fn for_event_file(path: impl Into<PathBuf>, options: &HelperOptions) -> Self {
        Self::with_event_file(path.into(), None, options)
    }

    fn with_event_file(
        event_file: PathBuf,
        owned: Option<TempPath>,
        options: &HelperOptions,
    ) -> Self {
        Self {
            event_file,
            owned,
            extra_flags: options.extra_flags.clone(),
            parse: options.parse,
            state: State::Pending,
            result: None,
            failed_targets: Vec::new(),
            closed: false,
        }
    }

    pub fn event_file(&self) -> &Path {
        &self.event_file
    }

    /// Keep the event file after this helper goes away, e.g. when another process runs the
    /// build. Returns its path.
    pub fn persist(mut self) -> io::Result<PathBuf> {
        if let Some(temp) = self.owned.take() {
            temp.keep().map_err(|err| err.error)?;
        }
        Ok(self.event_file.clone())
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Pending => SessionState::Pending,
            State::Resolved(_) => SessionState::Resolved,
            State::Consumed => SessionState::Consumed,
        }
    }

    /// Exit status reported by the stream; kept after the artifacts are consumed.
    pub fn build_result(&self) -> Option<&BuildResult> {
        self.result.as_ref()
    }

    /// Targets that failed or were aborted, in stream order.
    pub fn failed_targets(&self) -> &[Label] {
        &self.failed_targets
    }

    /// Takes the resolved output. `Ok(None)` when there is nothing to hand out.
    fn take(
        &mut self,
        query: &'static str,
    ) -> Result<Option<ParsedBuildOutput>, ArtifactResolutionFailure> {
        match std::mem::replace(&mut self.state, State::Consumed) {
            State::Pending => {
                self.state = State::Pending;
                tracing::debug!(
                    target = "kiln.build",
                    query,
                    "artifacts requested before the build finished"
                );
                Ok(None)
            }
            State::Resolved(resolved) => resolved.map(Some),
            State::Consumed => {
                tracing::debug!(
                    target = "kiln.build",
                    query,
                    "build artifacts were already consumed"
                );
                Ok(None)
            }
        }
    }
}

impl BuildResultHelper for BepBuildResultHelper {
    fn build_flags(&self) -> Vec<String> {
        let mut flags = vec![
            format!("--build_event_json_file={}", self.event_file.display()),
            // Keep local `file://` URIs instead of letting Bazel rewrite them.
            "--nobuild_event_json_file_path_conversion".to_string(),
        ];
        flags.extend(self.extra_flags.iter().cloned());
        flags
    }

    fn build_finished(&mut self) {
        if !matches!(self.state, State::Pending) {
            return;
        }

        let resolved = if self.closed {
            Err(ArtifactResolutionFailure::closed())
        } else {
            parse_build_event_file(&self.event_file, self.parse).map_err(Into::into)
        };

        match &resolved {
            Ok(parsed) => {
                self.result = parsed.build_result().cloned();
                self.failed_targets = parsed.failed_targets().into_iter().cloned().collect();
                tracing::debug!(
                    target = "kiln.build",
                    event_file = %self.event_file.display(),
                    status = ?self.result.as_ref().map(|r| r.status),
                    failed_targets = self.failed_targets.len(),
                    "build finished"
                );
            }
            Err(err) => {
                tracing::warn!(
                    target = "kiln.build",
                    event_file = %self.event_file.display(),
                    error = %err,
                    "could not read build event stream"
                );
            }
        }
        self.state = State::Resolved(resolved);
    }

    fn build_artifacts(&mut self) -> Result<Vec<OutputArtifact>, ArtifactResolutionFailure> {
        let Some(parsed) = self.take("all")? else {
            return Ok(Vec::new());
        };
        Ok(parsed.all_files().into_iter().map(OutputArtifact::from).collect())
    }

    fn build_artifacts_for_target(
        &mut self,
        target: &Label,
    ) -> Result<Vec<OutputArtifact>, ArtifactResolutionFailure> {
        let Some(parsed) = self.take("target")? else {
            return Ok(Vec::new());
        };
        if parsed.target(target).is_none() {
            tracing::debug!(
                target = "kiln.build",
                label = %target,
                "target does not appear in the build event stream"
            );
        }
        Ok(parsed
            .files_for_target(target)
            .into_iter()
            .map(OutputArtifact::from)
            .collect())
    }

    fn per_output_group_artifacts(
        &mut self,
    ) -> Result<OutputGroupArtifacts, ArtifactResolutionFailure> {
        let Some(parsed) = self.take("output_groups")? else {
            return Ok(OutputGroupArtifacts::new());
        };
        Ok(parsed
            .files_by_output_group()
            .into_iter()
            .map(|(name, files)| {
                (
                    name.to_string(),
                    files.into_iter().map(OutputArtifact::from).collect(),
                )
            })
            .collect())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(temp) = self.owned.take() {
            if let Err(err) = temp.close() {
                tracing::warn!(
                    target = "kiln.build",
                    event_file = %self.event_file.display(),
                    error = %err,
                    "failed to delete build event file"
                );
            }
        }
    }
}

impl Drop for BepBuildResultHelper {
    fn drop(&mut self) {
        self.close();
    }
}
