//! Value types shared by the Kiln crates.
//!
//! - [`Label`]: Bazel target identifiers (`@repo//package:name`)
//! - [`TargetKind`] / [`RuleType`]: rule classes such as `java_binary`
//! - workspace-root discovery (`MODULE.bazel`, `REPO.bazel`, `WORKSPACE`, ...)

mod kind;
mod label;
mod workspace;

pub use crate::{
    kind::{RuleType, TargetKind},
    label::{is_wildcard_pattern, Label, LabelError},
    workspace::{bazel_workspace_root, is_bazel_workspace, WORKSPACE_MARKERS},
};
