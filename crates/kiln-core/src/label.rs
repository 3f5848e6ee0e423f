use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// A Bazel target label, e.g. `//java/com/example:hello` or `@@rules_jvm~//:lib`.
///
/// Labels are normalized on parse:
/// - `//pkg` is shorthand for `//pkg:pkg`
/// - `@//pkg:t` and `@@//pkg:t` both refer to the main repository and become `//pkg:t`
///
/// Comparison, hashing and ordering use the normalized form, so a label parsed from the build
/// event stream matches one typed by a user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    /// Repository prefix including its `@`/`@@` sigil; empty for the main repository.
    repo: String,
    package: String,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid label `{label}`: {reason}")]
pub struct LabelError {
    pub label: String,
    pub reason: &'static str,
}

impl Label {
    pub fn parse(input: &str) -> Result<Self, LabelError> {
        let err = |reason| LabelError {
            label: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        let Some(split) = trimmed.find("//") else {
            return Err(err("missing `//`"));
        };
        let (repo, rest) = (&trimmed[..split], &trimmed[split + 2..]);

        let repo = match repo {
            "" | "@" | "@@" => String::new(),
            repo => {
                let bare = repo
                    .strip_prefix("@@")
                    .or_else(|| repo.strip_prefix('@'))
                    .ok_or_else(|| err("repository must start with `@`"))?;
                if !bare.chars().all(is_repo_char) {
                    return Err(err("invalid character in repository name"));
                }
                repo.to_string()
            }
        };

        let (package, name) = match rest.split_once(':') {
            Some((package, name)) => (package, name),
            None => {
                let last = rest.rsplit('/').next().unwrap_or(rest);
                (rest, last)
            }
        };

        if package.starts_with('/') || package.ends_with('/') || package.contains("//") {
            return Err(err("malformed package path"));
        }
        if package.split('/').any(|segment| segment == "..") {
            return Err(err("package may not contain `..`"));
        }
        if package.split('/').any(|segment| segment == "...") {
            return Err(err("`...` is a target pattern, not a label"));
        }
        if name.is_empty() {
            return Err(err("empty target name"));
        }
        if name.contains(':') || name.starts_with('/') || name.ends_with('/') {
            return Err(err("malformed target name"));
        }
        if package
            .chars()
            .chain(name.chars())
            .any(|c| c.is_control() || c == '\n')
        {
            return Err(err("control characters are not allowed"));
        }

        Ok(Self {
            repo,
            package: package.to_string(),
            name: name.to_string(),
        })
    }

    /// Repository prefix (`@repo` / `@@repo`), or `""` for the main repository.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_main_repo(&self) -> bool {
        self.repo.is_empty()
    }
}

/// Whether `pattern` can name several targets: a recursive `...` package or one of the
/// `all`, `*` and `all-targets` wildcards, e.g. `//...`, `//java/...:all` or `//pkg:*`.
///
/// Such patterns are handed to Bazel as typed; they never parse as a [`Label`].
pub fn is_wildcard_pattern(pattern: &str) -> bool {
    let pattern = pattern.trim();
    let rest = match pattern.find("//") {
        Some(split) => &pattern[split + 2..],
        None => pattern,
    };
    let (package, name) = match rest.split_once(':') {
        Some((package, name)) => (package, Some(name)),
        None => (rest, None),
    };
    package.split('/').any(|segment| segment == "...")
        || matches!(name, Some("all" | "*" | "all-targets"))
}

fn is_repo_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+' | '~')
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}//{}:{}", self.repo, self.package, self.name)
    }
}

impl FromStr for Label {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Label::parse(&raw).map_err(serde::de::Error::custom)
    }
}
