use kiln_bep::BepFile;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// One file produced by a build invocation.
///
/// Identity is the workspace-relative output path (e.g.
/// `bazel-out/k8-fastbuild/bin/app/app.jar`): every artifact view lists a path at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputArtifact {
    relative_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
}

impl OutputArtifact {
    pub fn new(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            uri: None,
            digest: None,
            length: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Content digest as reported by Bazel, if any.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Local filesystem path for `file://` URIs.
    ///
    /// Remote (`bytestream://`) artifacts have no local path.
    pub fn local_path(&self) -> Option<PathBuf> {
        let url = url::Url::parse(self.uri.as_deref()?).ok()?;
        if url.scheme() != "file" {
            return None;
        }
        url.to_file_path().ok()
    }

    /// Resolve the artifact against `workspace_root` when no local URI is known.
    pub fn path_in(&self, workspace_root: &Path) -> PathBuf {
        self.local_path()
            .unwrap_or_else(|| workspace_root.join(&self.relative_path))
    }

    /// Snapshot used to tell whether an artifact changed between two builds.
    ///
    /// Uses Bazel's digest when the stream carried one, otherwise hashes the local file.
    pub fn to_artifact_state(&self, workspace_root: &Path) -> io::Result<ArtifactState> {
        let digest = match &self.digest {
            Some(digest) => digest.clone(),
            None => {
                let bytes = fs::read(self.path_in(workspace_root))?;
                format!("blake3:{}", blake3::hash(&bytes).to_hex())
            }
        };
        Ok(ArtifactState {
            relative_path: self.relative_path.clone(),
            digest,
        })
    }
}

impl From<&BepFile> for OutputArtifact {
    fn from(file: &BepFile) -> Self {
        let mut artifact = Self::new(file.relative_path());
        if let Some(uri) = &file.uri {
            artifact = artifact.with_uri(uri.as_str());
        }
        if let Some(digest) = file.digest.as_deref().filter(|d| !d.is_empty()) {
            artifact = artifact.with_digest(digest);
        }
        artifact.length = file.length;
        artifact
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactState {
    pub relative_path: String,
    pub digest: String,
}
