use std::{io, path::PathBuf};

/// Why a build event stream could not be turned into a [`crate::ParsedBuildOutput`].
#[derive(Debug, thiserror::Error)]
pub enum BepError {
    #[error("build event file {} does not exist", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read build events: {0}")]
    Io(#[from] io::Error),

    #[error("malformed build event on line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error(
        "build event stream ended after {events} event(s) without a final event; \
         the build was likely interrupted"
    )]
    Truncated { events: usize },

    #[error("build event stream references unknown file set `{id}`")]
    UnknownFileSet { id: String },
}

impl BepError {
    pub(crate) fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            message: message.into(),
        }
    }
}
