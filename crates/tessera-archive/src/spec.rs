//! The module spec: a declarative manifest embedded in every archive.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;
use crate::module_id::ModuleId;

/// The file name a module spec is looked for under inside an archive, unless
/// the archive source is configured with a different one.
pub const DEFAULT_SPEC_FILE_NAME: &str = "moduleSpec.json";

/// The declarative manifest attached to an archive.
///
/// Only `module_id` is required on the wire; every other field defaults to
/// an empty collection. Unknown JSON fields are ignored on deserialization,
/// and `serialize(deserialize(json)) == json` holds modulo field order and
/// insignificant whitespace: no field is dropped on a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    pub module_id: ModuleId,

    #[serde(default)]
    pub compiler_plugin_ids: BTreeSet<String>,

    #[serde(default)]
    pub module_dependencies: BTreeSet<ModuleId>,

    #[serde(default)]
    pub import_package_filters: Vec<String>,

    #[serde(default)]
    pub export_package_filters: Vec<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_data: Option<BTreeMap<String, String>>,
}

impl ModuleSpec {
    /// Build the minimal valid spec for a module with no dependencies and no
    /// required compiler.
    pub fn minimal(module_id: ModuleId) -> Self {
        ModuleSpec {
            module_id,
            compiler_plugin_ids: BTreeSet::new(),
            module_dependencies: BTreeSet::new(),
            import_package_filters: Vec::new(),
            export_package_filters: Vec::new(),
            metadata: BTreeMap::new(),
            app_data: None,
        }
    }

    /// Parse a spec from its JSON wire form.
    ///
    /// # Errors
    /// Returns [`ArchiveError::SpecParseError`] if `json` is not valid JSON
    /// or does not match the spec shape.
    pub fn from_json(json: &str, location: &str) -> Result<Self, ArchiveError> {
        serde_json::from_str(json).map_err(|source| ArchiveError::SpecParseError {
            location: location.to_owned(),
            source,
        })
    }

    /// Serialize this spec to its JSON wire form.
    ///
    /// # Errors
    /// Returns [`ArchiveError::SpecParseError`]-shaped failure only in the
    /// (practically unreachable) case that the spec contains data that
    /// cannot be represented as JSON.
    pub fn to_json(&self) -> Result<String, ArchiveError> {
        serde_json::to_string_pretty(self).map_err(|source| ArchiveError::SpecParseError {
            location: self.module_id.to_string(),
            source,
        })
    }
}
