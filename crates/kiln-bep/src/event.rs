use crate::BepError;
use kiln_core::Label;
use serde::{de::IgnoredAny, Deserialize, Deserializer, Serialize};

/// A file reported in a `namedSetOfFiles` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BepFile {
    /// Path relative to the output root named by `path_prefix`.
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
    /// Output root segments, e.g. `["bazel-out", "k8-fastbuild", "bin"]`.
    #[serde(default)]
    pub path_prefix: Vec<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default, deserialize_with = "int64")]
    pub length: Option<u64>,
}

impl BepFile {
    /// Workspace-relative output path (`path_prefix` joined with `name`).
    pub fn relative_path(&self) -> String {
        let mut path = String::new();
        for segment in self.path_prefix.iter().filter(|s| !s.is_empty()) {
            path.push_str(segment);
            path.push('/');
        }
        path.push_str(&self.name);
        path
    }
}

/// proto3 JSON renders 64-bit integers as strings.
fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(u64),
        Text(String),
    }

    match Option::<Int64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Int64::Number(n)) => Ok(Some(n)),
        Some(Int64::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// An output group of a completed target and the named sets it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputGroupRef {
    pub name: String,
    pub file_sets: Vec<String>,
    /// Bazel could not build every file in this group.
    pub incomplete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    /// The build or some tests failed (exit codes 1 and 3).
    BuildError,
    /// Interrupted, e.g. Ctrl-C or a killed client (exit code 8).
    Cancelled,
    FatalError,
}

impl BuildStatus {
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 | 3 => Self::BuildError,
            8 => Self::Cancelled,
            _ => Self::FatalError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    pub exit_code: i32,
    /// Bazel's name for the exit code (`SUCCESS`, `BUILD_FAILURE`, ...).
    pub exit_name: String,
    pub status: BuildStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStarted {
    pub uuid: String,
    pub command: String,
}

/// The subset of build events Kiln understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Started(BuildStarted),
    NamedSetOfFiles {
        id: String,
        files: Vec<BepFile>,
        file_sets: Vec<String>,
    },
    TargetCompleted {
        label: Label,
        success: bool,
        output_groups: Vec<OutputGroupRef>,
    },
    Aborted {
        label: Label,
        reason: String,
        description: String,
    },
    BuildFinished(BuildResult),
    Other,
}

/// One decoded line of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub event: BuildEvent,
    /// Set on the final event Bazel writes.
    pub last_message: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    id: RawEventId,
    #[serde(default)]
    last_message: bool,
    #[serde(default)]
    started: Option<RawStarted>,
    #[serde(default)]
    named_set_of_files: Option<RawNamedSet>,
    #[serde(default)]
    completed: Option<RawTargetComplete>,
    #[serde(default)]
    aborted: Option<RawAborted>,
    #[serde(default)]
    finished: Option<RawFinished>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawEventId {
    started: Option<IgnoredAny>,
    named_set: Option<RawSetId>,
    target_completed: Option<RawTargetId>,
    build_finished: Option<IgnoredAny>,
}

#[derive(Deserialize)]
struct RawSetId {
    id: String,
}

#[derive(Deserialize)]
struct RawTargetId {
    label: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawStarted {
    uuid: String,
    command: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawNamedSet {
    files: Vec<BepFile>,
    file_sets: Vec<RawSetId>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawTargetComplete {
    success: bool,
    output_group: Vec<RawOutputGroup>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawOutputGroup {
    name: String,
    file_sets: Vec<RawSetId>,
    incomplete: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawAborted {
    reason: String,
    description: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawFinished {
    exit_code: Option<RawExitCode>,
    /// Deprecated; only consulted when `exitCode` is missing.
    overall_success: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawExitCode {
    name: String,
    code: i32,
}

impl EventRecord {
    /// Decode one line of `--build_event_json_file` output. `line` is 1-based and only used for
    /// error messages.
    pub fn decode(line: usize, text: &str) -> Result<Self, BepError> {
        let raw: RawEvent =
            serde_json::from_str(text).map_err(|err| BepError::malformed(line, err.to_string()))?;

        let label = |raw: &RawTargetId| {
            Label::parse(&raw.label).map_err(|err| BepError::malformed(line, err.to_string()))
        };

        let event = if raw.id.started.is_some() {
            let started = raw.started.unwrap_or_default();
            BuildEvent::Started(BuildStarted {
                uuid: started.uuid,
                command: started.command,
            })
        } else if let Some(set) = &raw.id.named_set {
            let payload = raw.named_set_of_files.unwrap_or_default();
            if let Some(file) = payload.files.iter().find(|f| f.name.is_empty()) {
                return Err(BepError::malformed(
                    line,
                    format!(
                        "file in named set `{}` has no name (uri: {})",
                        set.id,
                        file.uri.as_deref().unwrap_or("<none>")
                    ),
                ));
            }
            BuildEvent::NamedSetOfFiles {
                id: set.id.clone(),
                files: payload.files,
                file_sets: payload.file_sets.into_iter().map(|s| s.id).collect(),
            }
        } else if let Some(target) = &raw.id.target_completed {
            if let Some(aborted) = raw.aborted {
                BuildEvent::Aborted {
                    label: label(target)?,
                    reason: aborted.reason,
                    description: aborted.description,
                }
            } else if let Some(completed) = raw.completed {
                BuildEvent::TargetCompleted {
                    label: label(target)?,
                    success: completed.success,
                    output_groups: completed
                        .output_group
                        .into_iter()
                        .map(|group| OutputGroupRef {
                            name: group.name,
                            file_sets: group.file_sets.into_iter().map(|s| s.id).collect(),
                            incomplete: group.incomplete,
                        })
                        .collect(),
                }
            } else {
                return Err(BepError::malformed(
                    line,
                    format!(
                        "targetCompleted event for {} has neither `completed` nor `aborted`",
                        target.label
                    ),
                ));
            }
        } else if raw.id.build_finished.is_some() {
            let finished = raw.finished.unwrap_or_default();
            let exit = finished.exit_code.unwrap_or_else(|| {
                let (name, code) = if finished.overall_success {
                    ("SUCCESS", 0)
                } else {
                    ("BUILD_FAILURE", 1)
                };
                RawExitCode {
                    name: name.to_string(),
                    code,
                }
            });
            BuildEvent::BuildFinished(BuildResult {
                exit_code: exit.code,
                status: BuildStatus::from_exit_code(exit.code),
                exit_name: exit.name,
            })
        } else {
            BuildEvent::Other
        };

        Ok(Self {
            event,
            last_message: raw.last_message,
        })
    }
}
