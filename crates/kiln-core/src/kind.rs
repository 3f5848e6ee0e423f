use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a rule class, derived from Bazel's naming conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Binary,
    Test,
    Library,
    Unknown,
}

/// A rule class name as reported by `bazel query --output=label_kind`, e.g. `java_binary`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetKind(String);

impl TargetKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn rule_type(&self) -> RuleType {
        let name = self.0.as_str();
        if name.ends_with("_test") || name == "test_suite" {
            RuleType::Test
        } else if name.ends_with("_binary") {
            RuleType::Binary
        } else if name.ends_with("_library") || name.ends_with("_import") {
            RuleType::Library
        } else {
            RuleType::Unknown
        }
    }

    /// Language prefix of the rule class (`java` for `java_binary`), if it has one.
    pub fn language(&self) -> Option<&str> {
        let (prefix, _) = self.0.split_once('_')?;
        (!prefix.is_empty()).then_some(prefix)
    }

    pub fn is_runnable(&self) -> bool {
        matches!(self.rule_type(), RuleType::Binary | RuleType::Test)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetKind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
