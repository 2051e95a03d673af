//! Lookup of named fields in a build event's annotations.
//!
//! Build events carry free-form metadata in one of two shapes: a key/value
//! substitution map, or a list of "name-value" tag strings. A deployment uses
//! one shape; callers pick it with [`MetadataCarrier`] and the rest of the
//! crate stays agnostic of which one is active.

use std::collections::BTreeMap;

/// Which annotation shape carries build metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataCarrier {
    #[default]
    Substitutions,
    Tags,
}

impl std::fmt::Display for MetadataCarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Substitutions => write!(f, "substitutions"),
            Self::Tags => write!(f, "tags"),
        }
    }
}

impl std::str::FromStr for MetadataCarrier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "substitutions" => Ok(Self::Substitutions),
            "tags" => Ok(Self::Tags),
            _ => Err(format!("unknown metadata carrier: {}", s)),
        }
    }
}

/// Logical metadata fields used by the renderers and filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    TriggerName,
    Commit,
    Branch,
    Repo,
}

impl MetadataField {
    /// Name of the field within the given carrier
    pub fn key(self, carrier: MetadataCarrier) -> &'static str {
        match (carrier, self) {
            (MetadataCarrier::Substitutions, Self::TriggerName) => "TRIGGER_NAME",
            (MetadataCarrier::Substitutions, Self::Commit) => "COMMIT_SHA",
            (MetadataCarrier::Substitutions, Self::Branch) => "BRANCH_NAME",
            (MetadataCarrier::Substitutions, Self::Repo) => "REPO_NAME",
            (MetadataCarrier::Tags, Self::TriggerName) => "trigger-name",
            (MetadataCarrier::Tags, Self::Commit) => "commit",
            (MetadataCarrier::Tags, Self::Branch) => "branch",
            (MetadataCarrier::Tags, Self::Repo) => "repo",
        }
    }
}

/// Borrowed view of an event's annotations
#[derive(Debug, Clone, Copy)]
pub enum Metadata<'a> {
    Substitutions(&'a BTreeMap<String, String>),
    Tags(&'a [String]),
}

impl Metadata<'_> {
    /// Find the value for `name`, or `default` if there's none.
    ///
    /// Substitutions are looked up by key. For tags, the first tag starting
    /// with `name` followed by '-' wins and the remainder of the tag is
    /// returned. Values are returned exactly as stored.
    pub fn lookup(&self, name: &str, default: &str) -> String {
        let found = match self {
            Self::Substitutions(map) => map.get(name).map(String::as_str),
            Self::Tags(tags) => tags
                .iter()
                .find_map(|tag| tag.strip_prefix(name)?.strip_prefix('-')),
        };
        found.unwrap_or(default).to_string()
    }
}
