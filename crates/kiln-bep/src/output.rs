use crate::{BepError, BepFile, BuildEvent, BuildResult, BuildStarted, EventRecord, OutputGroupRef};
use indexmap::IndexMap;
use kiln_core::Label;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Treat a stream without a `lastMessage` event as truncated.
    pub require_last_message: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            require_last_message: true,
        }
    }
}

/// Everything the stream said about one target label.
///
/// A label built in several configurations completes once per configuration; those records are
/// merged here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub label: Label,
    /// `true` only if every completion record for the label reported success.
    pub success: bool,
    pub output_groups: Vec<OutputGroupRef>,
    /// `(reason, description)` when the target was aborted instead of completed.
    pub aborted: Option<(String, String)>,
}

#[derive(Debug, Clone, Default)]
struct NamedSet {
    files: Vec<BepFile>,
    children: Vec<String>,
}

/// Folds [`EventRecord`]s into a [`ParsedBuildOutput`] one at a time.
///
/// Feeding events while the build is still running and calling [`Self::finish`] once it exits
/// gives the same result as parsing the complete file afterwards.
#[derive(Debug)]
pub struct BuildOutputAccumulator {
    options: ParseOptions,
    named_sets: IndexMap<String, NamedSet>,
    targets: IndexMap<Label, TargetOutcome>,
    started: Option<BuildStarted>,
    result: Option<BuildResult>,
    events: usize,
    finished: bool,
}

impl BuildOutputAccumulator {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            named_sets: IndexMap::new(),
            targets: IndexMap::new(),
            started: None,
            result: None,
            events: 0,
            finished: false,
        }
    }

    pub fn observe(&mut self, record: EventRecord) {
        if self.finished {
            tracing::debug!(
                target = "kiln.bep",
                event = ?record.event,
                "ignoring build event after lastMessage"
            );
            return;
        }

        self.events += 1;
        self.finished = record.last_message;

        match record.event {
            BuildEvent::Started(started) => self.started = Some(started),
            BuildEvent::NamedSetOfFiles {
                id,
                files,
                file_sets,
            } => {
                self.named_sets.insert(
                    id,
                    NamedSet {
                        files,
                        children: file_sets,
                    },
                );
            }
            BuildEvent::TargetCompleted {
                label,
                success,
                output_groups,
            } => {
                let outcome = self.target_mut(label);
                outcome.success &= success;
                outcome.output_groups.extend(output_groups);
            }
            BuildEvent::Aborted {
                label,
                reason,
                description,
            } => {
                let outcome = self.target_mut(label);
                outcome.success = false;
                outcome.aborted = Some((reason, description));
            }
            BuildEvent::BuildFinished(result) => self.result = Some(result),
            BuildEvent::Other => {}
        }
    }

    fn target_mut(&mut self, label: Label) -> &mut TargetOutcome {
        self.targets
            .entry(label.clone())
            .or_insert_with(|| TargetOutcome {
                label,
                success: true,
                output_groups: Vec::new(),
                aborted: None,
            })
    }

    /// Validate the collected events and produce the final output.
    pub fn finish(self) -> Result<ParsedBuildOutput, BepError> {
        if self.options.require_last_message && !self.finished {
            return Err(BepError::Truncated {
                events: self.events,
            });
        }

        let referenced = self
            .named_sets
            .values()
            .flat_map(|set| set.children.iter())
            .chain(
                self.targets
                    .values()
                    .flat_map(|t| t.output_groups.iter())
                    .flat_map(|g| g.file_sets.iter()),
            );
        for id in referenced {
            if !self.named_sets.contains_key(id) {
                return Err(BepError::UnknownFileSet { id: id.clone() });
            }
        }

        let mut direct_owners: HashMap<String, Vec<Label>> = HashMap::new();
        for target in self.targets.values() {
            for group in &target.output_groups {
                for id in &group.file_sets {
                    let owners = direct_owners.entry(id.clone()).or_default();
                    if !owners.contains(&target.label) {
                        owners.push(target.label.clone());
                    }
                }
            }
        }

        Ok(ParsedBuildOutput {
            named_sets: self.named_sets,
            targets: self.targets,
            direct_owners,
            started: self.started,
            result: self.result,
            events: self.events,
        })
    }
}

/// The decoded build event stream of one invocation.
///
/// File views are computed on demand from the named-set graph; each view lists a file once,
/// keyed by [`BepFile::relative_path`], in the order it is first reached.
#[derive(Debug, Clone)]
pub struct ParsedBuildOutput {
    named_sets: IndexMap<String, NamedSet>,
    targets: IndexMap<Label, TargetOutcome>,
    /// Named set id -> targets whose output groups reference it directly.
    direct_owners: HashMap<String, Vec<Label>>,
    started: Option<BuildStarted>,
    result: Option<BuildResult>,
    events: usize,
}

impl ParsedBuildOutput {
    pub fn started(&self) -> Option<&BuildStarted> {
        self.started.as_ref()
    }

    /// `None` when the stream had no `buildFinished` event.
    pub fn build_result(&self) -> Option<&BuildResult> {
        self.result.as_ref()
    }

    pub fn event_count(&self) -> usize {
        self.events
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.targets.values()
    }

    pub fn target(&self, label: &Label) -> Option<&TargetOutcome> {
        self.targets.get(label)
    }

    pub fn failed_targets(&self) -> Vec<&Label> {
        self.targets
            .values()
            .filter(|t| !t.success)
            .map(|t| &t.label)
            .collect()
    }

    /// Every file reachable from any target's output groups.
    pub fn all_files(&self) -> Vec<&BepFile> {
        let mut out = IndexMap::new();
        let mut visited = HashSet::new();
        for target in self.targets.values() {
            for group in &target.output_groups {
                self.collect(&group.file_sets, &mut visited, &mut out, |_| false);
            }
        }
        out.into_values().collect()
    }

    /// Files produced by `label` itself.
    ///
    /// Starts from the named sets referenced by the target's output groups and follows nested
    /// sets, except sets that another target references directly: those belong to that target.
    pub fn files_for_target(&self, label: &Label) -> Vec<&BepFile> {
        let Some(target) = self.targets.get(label) else {
            return Vec::new();
        };

        let mut out = IndexMap::new();
        let mut visited = HashSet::new();
        for group in &target.output_groups {
            self.collect(&group.file_sets, &mut visited, &mut out, |id| {
                self.direct_owners
                    .get(id)
                    .is_some_and(|owners| !owners.contains(label))
            });
        }
        out.into_values().collect()
    }

    /// Files grouped by output group name, in the order groups first appear.
    ///
    /// A file in several groups is listed under each of them.
    pub fn files_by_output_group(&self) -> IndexMap<&str, Vec<&BepFile>> {
        let mut groups: IndexMap<&str, (HashSet<&str>, IndexMap<String, &BepFile>)> =
            IndexMap::new();
        for target in self.targets.values() {
            for group in &target.output_groups {
                let (visited, files) = groups.entry(group.name.as_str()).or_default();
                self.collect(&group.file_sets, visited, files, |_| false);
            }
        }
        groups
            .into_iter()
            .map(|(name, (_, files))| (name, files.into_values().collect()))
            .collect()
    }

    /// Depth-first walk over the named-set graph starting at `roots`.
    ///
    /// A set's own files come before those of its children. Nested sets for which `skip` returns
    /// `true` are not entered; roots are always entered.
    fn collect<'a>(
        &'a self,
        roots: &'a [String],
        visited: &mut HashSet<&'a str>,
        out: &mut IndexMap<String, &'a BepFile>,
        skip: impl Fn(&str) -> bool,
    ) {
        let mut stack: Vec<&'a str> = roots.iter().rev().map(String::as_str).collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(set) = self.named_sets.get(id) else {
                continue;
            };

            for file in &set.files {
                out.entry(file.relative_path()).or_insert(file);
            }
            for child in set.children.iter().rev() {
                let child = child.as_str();
                if !skip(child) {
                    stack.push(child);
                }
            }
        }
    }
}
