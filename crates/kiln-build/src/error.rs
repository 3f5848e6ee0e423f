use kiln_bep::BepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bazel never wrote the event file.
    Missing,
    Io,
    /// A line could not be decoded.
    Malformed,
    /// The stream ended before Bazel's final event.
    Truncated,
    /// A named set was referenced but never announced.
    UnknownFileSet,
    /// The helper was closed before the build finished.
    Closed,
}

/// The build event stream of an invocation could not be turned into artifacts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to resolve build artifacts: {message}")]
pub struct ArtifactResolutionFailure {
    kind: FailureKind,
    message: String,
}

impl ArtifactResolutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn closed() -> Self {
        Self::new(
            FailureKind::Closed,
            "the build result helper was closed before the build finished",
        )
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<BepError> for ArtifactResolutionFailure {
    fn from(err: BepError) -> Self {
        let kind = match &err {
            BepError::Missing { .. } => FailureKind::Missing,
            BepError::Io(_) => FailureKind::Io,
            BepError::Malformed { .. } => FailureKind::Malformed,
            BepError::Truncated { .. } => FailureKind::Truncated,
            BepError::UnknownFileSet { .. } => FailureKind::UnknownFileSet,
        };
        Self::new(kind, err.to_string())
    }
}
