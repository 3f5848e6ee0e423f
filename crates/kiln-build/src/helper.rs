use crate::{ArtifactResolutionFailure, OutputArtifact};
use indexmap::IndexMap;
use kiln_core::Label;
use serde::Serialize;

/// Artifacts keyed by output group name, in the order groups first appear in the stream.
///
/// Within a group each path appears once; an artifact may be listed under several groups.
/// Looking up a group that was never reported yields an empty slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OutputGroupArtifacts {
    groups: IndexMap<String, Vec<OutputArtifact>>,
}

impl OutputGroupArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, output_group: &str) -> &[OutputArtifact] {
        self.groups
            .get(output_group)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Removes and returns one group; empty when absent.
    pub fn take(&mut self, output_group: &str) -> Vec<OutputArtifact> {
        self.groups.shift_remove(output_group).unwrap_or_default()
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[OutputArtifact])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn push_group(&mut self, name: String, artifacts: Vec<OutputArtifact>) {
        self.groups.entry(name).or_default().extend(artifacts);
    }
}

impl FromIterator<(String, Vec<OutputArtifact>)> for OutputGroupArtifacts {
    fn from_iter<T: IntoIterator<Item = (String, Vec<OutputArtifact>)>>(iter: T) -> Self {
        let mut out = Self::new();
        for (name, artifacts) in iter {
            out.push_group(name, artifacts);
        }
        out
    }
}

/// Collects the outputs of one build invocation.
///
/// The lifecycle is strictly ordered: take [`Self::build_flags`] before the build starts, call
/// [`Self::build_finished`] once the build process has exited, make at most one extraction call,
/// then [`Self::close`].
///
/// Extraction before `build_finished`, or a second extraction, returns empty results rather than
/// failing. A resolution failure is reported by the first extraction only.
pub trait BuildResultHelper {
    /// Flags the build command must carry so this helper can observe the invocation.
    ///
    /// Side-effect free; repeated calls return the same flags.
    fn build_flags(&self) -> Vec<String>;

    /// The build process has exited, successfully or not.
    fn build_finished(&mut self);

    /// Every artifact the build produced.
    fn build_artifacts(&mut self) -> Result<Vec<OutputArtifact>, ArtifactResolutionFailure>;

    /// Artifacts produced by `target` itself, excluding those only reachable through the outputs
    /// of other requested targets.
    fn build_artifacts_for_target(
        &mut self,
        target: &Label,
    ) -> Result<Vec<OutputArtifact>, ArtifactResolutionFailure>;

    fn per_output_group_artifacts(
        &mut self,
    ) -> Result<OutputGroupArtifacts, ArtifactResolutionFailure>;

    /// Artifacts of a single output group; empty when the group was not produced.
    fn artifacts_for_output_group(
        &mut self,
        output_group: &str,
    ) -> Result<Vec<OutputArtifact>, ArtifactResolutionFailure> {
        Ok(self.per_output_group_artifacts()?.take(output_group))
    }

    /// Release resources held for this invocation. Idempotent.
    fn close(&mut self);
}
