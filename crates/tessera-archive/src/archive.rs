//! The archive model: a content-addressable bundle of entries plus a spec.

use std::collections::BTreeMap;

use crate::error::ArchiveError;
use crate::module_id::ModuleId;
use crate::spec::ModuleSpec;

/// A bundle of named byte entries plus the [`ModuleSpec`] that describes how
/// to compile and link them.
///
/// Archives are content-addressable: [`Archive::content_hash`] is computed
/// over every entry's name and bytes in name-sorted order, so two archives
/// built from the same logical contents (regardless of enumeration order)
/// hash identically, and any change to an entry's bytes or set of entries
/// changes the hash.
#[derive(Debug, Clone)]
pub struct Archive {
    spec: ModuleSpec,
    entries: BTreeMap<String, Vec<u8>>,
    create_time: i64,
}

impl Archive {
    /// Construct an archive directly from its parts.
    ///
    /// `entries` must not contain the spec's own serialized form; archive
    /// sources are responsible for excluding the spec entry before calling
    /// this constructor.
    pub fn new(spec: ModuleSpec, entries: BTreeMap<String, Vec<u8>>, create_time: i64) -> Self {
        Archive {
            spec,
            entries,
            create_time,
        }
    }

    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.spec.module_id
    }

    pub fn create_time(&self) -> i64 {
        self.create_time
    }

    /// Names of every entry, in sorted order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The bytes of a single entry, if present.
    pub fn entry_bytes(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Compute this archive's content hash: SHA-256 over every entry's name
    /// and bytes, in stable (name-sorted) order.
    pub fn content_hash(&self) -> String {
        tessera_util::hash::sha256_entries(
            self.entries
                .iter()
                .map(|(name, bytes)| (name.as_str(), bytes.as_slice())),
        )
    }
}

/// Derive a default module id from an archive file or directory stem, used
/// when no spec entry is present.
///
/// # Errors
/// Returns [`ArchiveError::InvalidSpec`] if `stem` isn't a valid module
/// name (e.g. it contains a `.`, which would make an all-default version
/// like `"0"` impossible to tell apart from a dotted name).
pub fn default_module_id_from_stem(stem: &str) -> Result<ModuleId, ArchiveError> {
    ModuleId::new(stem, "0")
}
