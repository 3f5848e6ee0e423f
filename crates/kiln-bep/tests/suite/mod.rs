use kiln_bep::{parse_build_events, ParseOptions, ParsedBuildOutput};
use std::{io::Cursor, path::PathBuf};

mod failures;
mod streaming;

pub fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name)
}

pub fn parse_str(stream: &str) -> ParsedBuildOutput {
    parse_build_events(Cursor::new(stream.as_bytes()), ParseOptions::default())
        .expect("stream should parse")
}
