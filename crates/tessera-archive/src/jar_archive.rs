//! Build an [`Archive`] from a zip/jar file on disk.

use std::io::Read;
use std::path::Path;

use zip::ZipArchive;

use crate::archive::{default_module_id_from_stem, Archive};
use crate::error::ArchiveError;
use crate::spec::{ModuleSpec, DEFAULT_SPEC_FILE_NAME};

/// Options controlling how a jar is turned into an archive. See
/// [`crate::path_archive::PathArchiveOptions`] for field meaning.
#[derive(Debug, Clone, Default)]
pub struct JarArchiveOptions {
    pub spec_file_name: Option<String>,
    pub create_time: Option<i64>,
}

/// Build an archive from every entry in the jar/zip file at `path`.
///
/// Entries are enumerated once at construction. Any entry whose name would
/// resolve outside of the jar's own namespace (an absolute path or a `..`
/// component — a "zip-slip" entry) is rejected with
/// [`ArchiveError::PathEscape`] rather than silently skipped, since such an
/// entry indicates a malformed or hostile archive.
///
/// # Errors
/// Returns [`ArchiveError::BadArchive`] if `path` is not a readable zip
/// file, [`ArchiveError::PathEscape`] if an entry attempts to traverse
/// outside the archive, and [`ArchiveError::SpecParseError`] if a spec
/// entry is present but invalid.
pub fn build_jar_archive(path: &Path, options: &JarArchiveOptions) -> Result<Archive, ArchiveError> {
    let location = path.display().to_string();
    let spec_file_name = options
        .spec_file_name
        .as_deref()
        .unwrap_or(DEFAULT_SPEC_FILE_NAME);

    let file = std::fs::File::open(path).map_err(|source| ArchiveError::Io {
        location: location.clone(),
        source,
    })?;
    let mut zip = ZipArchive::new(file).map_err(|source| ArchiveError::BadArchive {
        location: location.clone(),
        reason: source.to_string(),
    })?;

    let mut entries = std::collections::BTreeMap::new();
    let mut spec_bytes = None;

    for index in 0..zip.len() {
        let mut zip_file = zip.by_index(index).map_err(|source| ArchiveError::BadArchive {
            location: location.clone(),
            reason: source.to_string(),
        })?;
        if zip_file.is_dir() {
            continue;
        }
        let name = zip_file.name().to_owned();

        // Reject traversal before reading: a legitimate relative entry
        // joined onto an arbitrary root must never escape it.
        tessera_util::fs::safe_join(Path::new(""), &name).map_err(|source| {
            ArchiveError::PathEscape {
                location: location.clone(),
                source,
            }
        })?;

        let mut bytes = Vec::new();
        zip_file
            .read_to_end(&mut bytes)
            .map_err(|source| ArchiveError::Io {
                location: format!("{location}!{name}"),
                source,
            })?;

        if name == spec_file_name {
            spec_bytes = Some(bytes);
        } else {
            entries.insert(name, bytes);
        }
    }

    let spec = match spec_bytes {
        Some(bytes) => {
            let json = String::from_utf8_lossy(&bytes);
            ModuleSpec::from_json(&json, &location)?
        }
        None => {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| ArchiveError::BadArchive {
                    location: location.clone(),
                    reason: "jar path has no usable file stem to derive a module id from"
                        .to_owned(),
                })?;
            ModuleSpec::minimal(default_module_id_from_stem(stem)?)
        }
    };

    let create_time = match options.create_time {
        Some(t) => t,
        None => filesystem_create_time(path, &location)?,
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_test_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options: zip::write::FileOptions<'_, ()> =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, bytes) in entries {
            writer.start_file(*name, options.clone()).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn builds_archive_with_spec_entry() {
        let dir = tempfile::tempdir().unwrap();
        let jar_path = dir.path().join("hello.jar");
        write_test_jar(
            &jar_path,
            &[
                (DEFAULT_SPEC_FILE_NAME, br#"{"moduleId":"hello.v1"}"#),
                ("Hello.txt", b"payload"),
            ],
        );

        let archive = build_jar_archive(&jar_path, &JarArchiveOptions::default()).unwrap();
        assert_eq!(archive.module_id().canonical(), "hello.v1");
        assert_eq!(archive.entry_bytes("Hello.txt"), Some(b"payload".as_slice()));
        assert!(archive.entry_bytes(DEFAULT_SPEC_FILE_NAME).is_none());
    }

    #[test]
    fn derives_default_module_id_from_file_stem_when_spec_absent() {
        let dir = tempfile::tempdir().unwrap();
        let jar_path = dir.path().join("hello.jar");
        write_test_jar(&jar_path, &[("a.txt", b"x")]);

        let archive = build_jar_archive(&jar_path, &JarArchiveOptions::default()).unwrap();
        assert_eq!(archive.module_id().name(), "hello");
        assert_eq!(archive.module_id().version(), "0");
    }

    #[test]
    fn caller_supplied_create_time_wins_over_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let jar_path = dir.path().join("hello.jar");
        write_test_jar(&jar_path, &[(DEFAULT_SPEC_FILE_NAME, br#"{"moduleId":"hello.v1"}"#)]);

        let options = JarArchiveOptions {
            create_time: Some(99),
            ..Default::default()
        };
        let archive = build_jar_archive(&jar_path, &options).unwrap();
        assert_eq!(archive.create_time(), 99);
    }

    #[test]
    fn not_a_zip_file_is_bad_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-jar.jar");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        assert!(build_jar_archive(&path, &JarArchiveOptions::default()).is_err());
    }
}
