//! Build invocation and artifact resolution for Bazel.
//!
//! A [`BuildResultHelper`] is bound to exactly one build invocation:
//! 1. its [`BuildResultHelper::build_flags`] are appended to the `bazel build` command line
//! 2. once the build process exits, [`BuildResultHelper::build_finished`] resolves the build
//!    event stream
//! 3. one extraction call returns the artifacts (all, per target, or per output group)
//! 4. [`BuildResultHelper::close`] releases the event file
//!
//! [`BuildInvoker`] drives steps 1 and 2; [`HandlerRegistry`] picks the output groups to request
//! for a target kind.

mod artifact;
mod bep_helper;
mod command;
mod error;
mod handlers;
mod helper;
mod invoker;

pub use crate::{
    artifact::{ArtifactState, OutputArtifact},
    bep_helper::{BepBuildResultHelper, HelperOptions, SessionState},
    command::{CommandOutput, CommandRunner, DefaultCommandRunner},
    error::{ArtifactResolutionFailure, FailureKind},
    handlers::{HandlerRegistry, KindHandler, StaticHandler, GENERIC_HANDLER_ID},
    helper::{BuildResultHelper, OutputGroupArtifacts},
    invoker::{BuildInvoker, BuildOptions, BuildOutcome, BuildRequest},
};

pub use kiln_bep::{BuildResult, BuildStatus, ParseOptions};
pub use kiln_core::{Label, TargetKind};
pub use kiln_process::CancellationToken;
