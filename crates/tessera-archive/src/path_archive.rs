//! Build an [`Archive`] from a directory on disk.

use std::path::Path;

use tessera_util::fs::collect_relative_files;

use crate::archive::{default_module_id_from_stem, Archive};
use crate::error::ArchiveError;
use crate::spec::{ModuleSpec, DEFAULT_SPEC_FILE_NAME};

/// Options controlling how a directory is turned into an archive.
#[derive(Debug, Clone, Default)]
pub struct PathArchiveOptions {
    /// Name of the spec entry to look for, relative to `root`. Defaults to
    /// [`DEFAULT_SPEC_FILE_NAME`] when `None`.
    pub spec_file_name: Option<String>,
    /// Restrict the archive to exactly these entry names (relative to
    /// `root`, forward-slash separated) instead of every file under `root`.
    pub whitelist: Option<Vec<String>>,
    /// Caller-supplied create time (epoch ms). Falls back to the root
    /// directory's filesystem mtime when `None`.
    pub create_time: Option<i64>,
}

/// Build an archive from every file under `root` (or, if
/// `options.whitelist` is set, from exactly those relative paths).
///
/// If a spec entry is present it is parsed and excluded from the archive's
/// entry set; otherwise a minimal spec is synthesized with a module id
/// derived from `root`'s file-name stem.
///
/// # Errors
/// Returns [`ArchiveError::Io`] if `root` or a listed entry cannot be read,
/// [`ArchiveError::SpecParseError`] if a spec entry is present but invalid,
/// or [`ArchiveError::BadArchive`] if `root`'s name cannot be used to derive
/// a default module id and no spec entry was present.
pub fn build_path_archive(root: &Path, options: &PathArchiveOptions) -> Result<Archive, ArchiveError> {
    let spec_file_name = options
        .spec_file_name
        .as_deref()
        .unwrap_or(DEFAULT_SPEC_FILE_NAME);

    let relative_names = match &options.whitelist {
        Some(names) => names.clone(),
        None => collect_relative_files(root)?,
    };

    let mut entries = std::collections::BTreeMap::new();
    let mut spec_bytes = None;

    for name in relative_names {
        let path = root.join(&name);
        let bytes = std::fs::read(&path).map_err(|source| ArchiveError::Io {
            location: path.display().to_string(),
            source,
        })?;
        if name == spec_file_name {
            spec_bytes = Some(bytes);
        } else {
            entries.insert(name, bytes);
        }
    }

    let location = root.display().to_string();
    let spec = match spec_bytes {
        Some(bytes) => {
            let json = String::from_utf8_lossy(&bytes);
            ModuleSpec::from_json(&json, &location)?
        }
        None => {
            let stem = root
                .file_name()
                .and_then(|s| s.to_str())
                .ok_or_else(|| ArchiveError::BadArchive {
                    location: location.clone(),
                    reason: "root has no usable file name to derive a module id from".to_owned(),
                })?;
            ModuleSpec::minimal(default_module_id_from_stem(stem)?)
        }
    };

    let create_time = match options.create_time {
        Some(t) => t,
        None => filesystem_create_time(root, &location)?,
    };

    Ok(Archive::new(spec, entries, create_time))
}

fn filesystem_create_time(path: &Path, location: &str) -> Result<i64, ArchiveError> {
    let metadata = std::fs::metadata(path).map_err(|source| ArchiveError::Io {
        location: location.to_owned(),
        source,
    })?;
    let modified = metadata.modified().map_err(|source| ArchiveError::Io {
        location: location.to_owned(),
        source,
    })?;
    let epoch_ms = modified
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    Ok(epoch_ms)
}
