//! Decoding of Bazel's build event protocol (BEP).
//!
//! Bazel writes one JSON object per line to the file named by `--build_event_json_file`. This
//! crate reads that stream incrementally and folds it into a [`ParsedBuildOutput`]:
//! - named file sets (`namedSetOfFiles`) and the graph of nested sets
//! - per-target completion records and the output groups they reference
//! - the overall build result (`buildFinished`)
//!
//! Only the fields needed for artifact resolution are decoded; everything else is skipped.

mod error;
mod event;
mod output;
mod reader;

pub use crate::{
    error::BepError,
    event::{
        BepFile, BuildEvent, BuildResult, BuildStarted, BuildStatus, EventRecord, OutputGroupRef,
    },
    output::{BuildOutputAccumulator, ParseOptions, ParsedBuildOutput, TargetOutcome},
    reader::{parse_build_event_file, parse_build_events, BuildEventReader},
};
