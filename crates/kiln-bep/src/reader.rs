use crate::{BepError, BuildOutputAccumulator, EventRecord, ParseOptions, ParsedBuildOutput};
use std::{
    fs,
    io::{self, BufRead, BufReader},
    path::Path,
};

/// Streaming reader over `--build_event_json_file` output.
///
/// Yields one [`EventRecord`] per non-blank line. The first error ends the iteration.
pub struct BuildEventReader<R: BufRead> {
    reader: R,
    line_buf: String,
    line: usize,
    done: bool,
}

impl<R: BufRead> BuildEventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::new(),
            line: 0,
            done: false,
        }
    }

    /// Number of lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for BuildEventReader<R> {
    type Item = Result<EventRecord, BepError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.line_buf.clear();
            match self.reader.read_line(&mut self.line_buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    self.line += 1;
                    return Some(Err(if err.kind() == io::ErrorKind::InvalidData {
                        BepError::malformed(self.line, "stream is not valid UTF-8")
                    } else {
                        BepError::Io(err)
                    }));
                }
            }

            self.line += 1;
            let text = self.line_buf.trim();
            if text.is_empty() {
                continue;
            }

            let record = EventRecord::decode(self.line, text);
            if record.is_err() {
                self.done = true;
            }
            return Some(record);
        }
    }
}

/// Decode a whole stream into a [`ParsedBuildOutput`].
pub fn parse_build_events<R: BufRead>(
    reader: R,
    options: ParseOptions,
) -> Result<ParsedBuildOutput, BepError> {
    let mut accumulator = BuildOutputAccumulator::new(options);
    for record in BuildEventReader::new(reader) {
        accumulator.observe(record?);
    }
    accumulator.finish()
}

/// Decode the event file Bazel wrote for one invocation.
pub fn parse_build_event_file(
    path: &Path,
    options: ParseOptions,
) -> Result<ParsedBuildOutput, BepError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(BepError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(err.into()),
    };

    let parsed = parse_build_events(BufReader::new(file), options)?;
    tracing::debug!(
        target = "kiln.bep",
        path = %path.display(),
        events = parsed.event_count(),
        targets = parsed.targets().count(),
        "parsed build event file"
    );
    Ok(parsed)
}
