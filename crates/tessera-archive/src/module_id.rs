//! Module and revision identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// Identifies a module by name and version.
///
/// The canonical string form is `"name.version"`, used as a stable map key
/// throughout the loader and repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId {
    name: String,
    version: String,
}

impl ModuleId {
    /// Construct a module id from its parts.
    ///
    /// # Errors
    /// Returns [`ArchiveError::InvalidSpec`] if either part is empty or
    /// contains a `.` (which would make the canonical form ambiguous to
    /// parse back).
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, ArchiveError> {
        let name = name.into();
        let version = version.into();
        if name.is_empty() || version.is_empty() {
            return Err(ArchiveError::InvalidSpec {
                location: format!("{name}.{version}"),
                reason: "moduleId name and version must both be non-empty".to_owned(),
            });
        }
        if name.contains('.') || version.contains('.') {
            return Err(ArchiveError::InvalidSpec {
                location: format!("{name}.{version}"),
                reason: "moduleId name and version must not contain '.'".to_owned(),
            });
        }
        Ok(ModuleId { name, version })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The canonical `"name.version"` key form.
    pub fn canonical(&self) -> String {
        format!("{}.{}", self.name, self.version)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.version)
    }
}

impl FromStr for ModuleId {
    type Err = ArchiveError;

    /// Parse a `"name.version"` string. The version is everything after the
    /// first `.`, so versions containing further separators (e.g.
    /// `"1.2.3"`-shaped names) are rejected at construction, not at parse
    /// time, to keep this split unambiguous: callers must name modules and
    /// versions that don't themselves contain `.`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((name, version)) = s.split_once('.') else {
            return Err(ArchiveError::InvalidSpec {
                location: s.to_owned(),
                reason: "moduleId must have the form \"name.version\"".to_owned(),
            });
        };
        ModuleId::new(name, version)
    }
}

impl TryFrom<String> for ModuleId {
    type Error = ArchiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleId> for String {
    fn from(value: ModuleId) -> Self {
        value.canonical()
    }
}

/// Internal identifier for a specific generation of a module.
///
/// Only the loader constructs these; callers never parse or serialize a
/// `RevisionId`, they only observe monotonically increasing `revision`
/// numbers per [`ModuleId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionId {
    module_id: ModuleId,
    revision: u64,
}

impl RevisionId {
    pub(crate) fn new(module_id: ModuleId, revision: u64) -> Self {
        RevisionId {
            module_id,
            revision,
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.module_id, self.revision)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_round_trips_through_from_str() {
        let id = ModuleId::new("hello", "v1").unwrap();
        let parsed: ModuleId = id.canonical().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_empty_name_or_version() {
        assert!(ModuleId::new("", "v1").is_err());
        assert!(ModuleId::new("hello", "").is_err());
    }

    #[test]
    fn rejects_dotted_parts() {
        assert!(ModuleId::new("he.llo", "v1").is_err());
        assert!(ModuleId::new("hello", "v1.0").is_err());
    }

    #[test]
    fn from_str_rejects_missing_separator() {
        assert!("helloworld".parse::<ModuleId>().is_err());
    }

    #[test]
    fn display_matches_canonical() {
        let id = ModuleId::new("hello", "v1").unwrap();
        assert_eq!(id.to_string(), id.canonical());
    }

    #[test]
    fn equality_is_by_name_and_version() {
        let a = ModuleId::new("hello", "v1").unwrap();
        let b = ModuleId::new("hello", "v1").unwrap();
        let c = ModuleId::new("hello", "v2").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn serde_round_trip_via_canonical_string() {
        let id = ModuleId::new("hello", "v1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"hello.v1\"");
        let parsed: ModuleId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn revision_id_display() {
        let id = ModuleId::new("hello", "v1").unwrap();
        let rev = RevisionId::new(id, 3);
        assert_eq!(rev.to_string(), "hello.v1#3");
    }
}
