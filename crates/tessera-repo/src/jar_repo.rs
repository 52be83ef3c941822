//! A repository storing one zip archive file per module.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use tessera_archive::{Archive, ModuleId, ModuleSpec};
use tessera_util::fs::{ensure_dir, safe_join};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::RepoError;
use crate::view::{ArchiveSummary, RepositorySummary, RepositoryView};

const SPEC_FILE_NAME: &str = "moduleSpec.json";

#[derive(Debug, Clone)]
struct IndexEntry {
    create_time: i64,
    content_hash: String,
}

/// A zip-filesystem repository: one `.jar`-style zip file per module,
/// named by its canonical module id.
pub struct JarFilesystemRepository {
    root: PathBuf,
    output_dir: PathBuf,
    index: Mutex<BTreeMap<ModuleId, IndexEntry>>,
}

impl JarFilesystemRepository {
    /// Open (creating if absent) a jar repository rooted at `root`,
    /// materializing `get_script_archives` results under `output_dir`.
    ///
    /// # Errors
    /// Returns an error if `root` cannot be created or its existing jar
    /// files cannot be read.
    pub fn open(root: PathBuf, output_dir: PathBuf) -> Result<Self, RepoError> {
        ensure_dir(&root)?;
        let repo = JarFilesystemRepository {
            root,
            output_dir,
            index: Mutex::new(BTreeMap::new()),
        };
        repo.reload_index()?;
        Ok(repo)
    }

    fn jar_path(&self, module_id: &ModuleId) -> PathBuf {
        self.root.join(format!("{}.jar", module_id.canonical()))
    }

    fn reload_index(&self) -> Result<(), RepoError> {
        let mut index = self
            .index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        index.clear();

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(RepoError::Io {
                    path: self.root.display().to_string(),
                    source,
                })
            }
        };

        for entry in entries {
            let entry = entry.map_err(|source| RepoError::Io {
                path: self.root.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jar") {
                continue;
            }
            let (_, archive) = read_jar(&path)?;
            index.insert(
                archive.module_id().clone(),
                IndexEntry {
                    create_time: archive.create_time(),
                    content_hash: archive.content_hash(),
                },
            );
        }
        Ok(())
    }
}

fn read_jar(path: &std::path::Path) -> Result<(PathBuf, Archive), RepoError> {
    let file = std::fs::File::open(path).map_err(|source| RepoError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut zip = ZipArchive::new(file).map_err(|source| RepoError::Io {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
    })?;

    let spec_json = {
        let mut spec_entry = zip.by_name(SPEC_FILE_NAME).map_err(|source| RepoError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, source),
        })?;
        let mut buf = String::new();
        spec_entry
            .read_to_string(&mut buf)
            .map_err(|source| RepoError::Io {
                path: path.display().to_string(),
                source,
            })?;
        buf
    };
    let spec = ModuleSpec::from_json(&spec_json, &path.display().to_string())?;

    let mut entries = BTreeMap::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|source| RepoError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
        })?;
        if entry.is_dir() || entry.name() == SPEC_FILE_NAME {
            continue;
        }
        let name = entry.name().to_owned();
        safe_join(std::path::Path::new(""), &name)?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(|source| RepoError::Io {
            path: path.display().to_string(),
            source,
        })?;
        entries.insert(name, bytes);
    }

    let create_time = path
        .metadata()
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));

    Ok((path.to_path_buf(), Archive::new(spec, entries, create_time)))
}

impl crate::repository::Repository for JarFilesystemRepository {
    fn insert_archive(&self, archive: &Archive) -> Result<(), RepoError> {
        let module_id = archive.module_id().clone();

        {
            let index = self
                .index
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(existing) = index.get(&module_id) {
                if archive.create_time() <= existing.create_time {
                    return Ok(());
                }
            }
        }

        let path = self.jar_path(&module_id);
        let file = std::fs::File::create(&path).map_err(|source| RepoError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::<()>::default();

        writer
            .start_file(SPEC_FILE_NAME, options)
            .map_err(|source| RepoError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, source),
            })?;
        writer
            .write_all(archive.spec().to_json()?.as_bytes())
            .map_err(|source| RepoError::Io {
                path: path.display().to_string(),
                source,
            })?;

        for name in archive.entry_names() {
            let Some(bytes) = archive.entry_bytes(name) else {
                continue; // unreachable: name came from entry_names()
            };
            writer
                .start_file(name, options)
                .map_err(|source| RepoError::Io {
                    path: path.display().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, source),
                })?;
            writer.write_all(bytes).map_err(|source| RepoError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }

        writer.finish().map_err(|source| RepoError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, source),
        })?;

        self.index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                module_id,
                IndexEntry {
                    create_time: archive.create_time(),
                    content_hash: archive.content_hash(),
                },
            );
        Ok(())
    }

    fn delete_archive(&self, module_id: &ModuleId) -> Result<(), RepoError> {
        let path = self.jar_path(module_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RepoError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        }
        self.index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(module_id);
        Ok(())
    }

    fn get_script_archives(
        &self,
        module_ids: &BTreeSet<ModuleId>,
    ) -> Result<BTreeMap<ModuleId, Archive>, RepoError> {
        ensure_dir(&self.output_dir)?;
        let mut found = BTreeMap::new();
        for module_id in module_ids {
            let path = self.jar_path(module_id);
            if !path.is_file() {
                continue;
            }
            let (_, archive) = read_jar(&path)?;

            let dest = self.output_dir.join(module_id.canonical());
            tessera_util::fs::remove_dir_all_if_exists(&dest)?;
            ensure_dir(&dest)?;
            for name in archive.entry_names() {
                let Some(bytes) = archive.entry_bytes(name) else {
                    continue; // unreachable: name came from entry_names()
                };
                let dest_path = safe_join(&dest, name)?;
                if let Some(parent) = dest_path.parent() {
                    ensure_dir(parent)?;
                }
                std::fs::write(&dest_path, bytes).map_err(|source| RepoError::Io {
                    path: dest_path.display().to_string(),
                    source,
                })?;
            }
            found.insert(module_id.clone(), archive);
        }
        Ok(found)
    }

    fn get_default_view(&self) -> Result<Box<dyn RepositoryView>, RepoError> {
        let index = self
            .index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(Box::new(JarView {
            entries: index.clone(),
        }))
    }
}

struct JarView {
    entries: BTreeMap<ModuleId, IndexEntry>,
}

impl RepositoryView for JarView {
    fn archive_update_times(&self) -> BTreeMap<ModuleId, i64> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.create_time))
            .collect()
    }

    fn repository_summary(&self) -> RepositorySummary {
        RepositorySummary {
            module_count: self.entries.len(),
            latest_update_time: self.entries.values().map(|e| e.create_time).max().unwrap_or(0),
        }
    }

    fn archive_summaries(&self) -> Vec<ArchiveSummary> {
        self.entries
            .iter()
            .map(|(id, entry)| ArchiveSummary {
                module_id: id.clone(),
                create_time: entry.create_time,
                content_hash: entry.content_hash.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tessera_archive::ModuleSpec;

    use super::*;
    use crate::repository::Repository;

    fn archive(name: &str, create_time: i64) -> Archive {
        let mut entries = BTreeMap::new();
        entries.insert("Hello.txt".to_owned(), b"payload".to_vec());
        Archive::new(
            ModuleSpec::minimal(ModuleId::new(name, "v1").unwrap()),
            entries,
            create_time,
        )
    }

    #[test]
    fn insert_then_fetch_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let repo =
            JarFilesystemRepository::open(tmp.path().join("repo"), tmp.path().join("out")).unwrap();

        let a = archive("hello", 10);
        repo.insert_archive(&a).unwrap();
        assert!(repo.jar_path(a.module_id()).is_file());

        let module_ids = BTreeSet::from([a.module_id().clone()]);
        let fetched = repo.get_script_archives(&module_ids).unwrap();
        let fetched_archive = fetched.get(a.module_id()).unwrap();
        assert_eq!(fetched_archive.entry_bytes("Hello.txt"), Some(b"payload".as_slice()));
    }

    #[test]
    fn older_create_time_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let repo =
            JarFilesystemRepository::open(tmp.path().join("repo"), tmp.path().join("out")).unwrap();

        repo.insert_archive(&archive("hello", 10)).unwrap();
        repo.insert_archive(&archive("hello", 5)).unwrap();

        let view = repo.get_default_view().unwrap();
        assert_eq!(
            view.archive_update_times().get(&ModuleId::new("hello", "v1").unwrap()),
            Some(&10)
        );
    }

    #[test]
    fn delete_removes_jar_file() {
        let tmp = tempfile::tempdir().unwrap();
        let repo =
            JarFilesystemRepository::open(tmp.path().join("repo"), tmp.path().join("out")).unwrap();

        let a = archive("hello", 10);
        repo.insert_archive(&a).unwrap();
        repo.delete_archive(a.module_id()).unwrap();
        assert!(!repo.jar_path(a.module_id()).is_file());
    }

    #[test]
    fn reopening_repository_reloads_existing_jars() {
        let tmp = tempfile::tempdir().unwrap();
        let repo_root = tmp.path().join("repo");
        let out = tmp.path().join("out");

        {
            let repo = JarFilesystemRepository::open(repo_root.clone(), out.clone()).unwrap();
            repo.insert_archive(&archive("hello", 10)).unwrap();
        }

        let reopened = JarFilesystemRepository::open(repo_root, out).unwrap();
        let view = reopened.get_default_view().unwrap();
        assert_eq!(view.archive_update_times().len(), 1);
    }
}
