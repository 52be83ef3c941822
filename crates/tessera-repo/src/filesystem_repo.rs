//! A repository storing one subdirectory per module, contents extracted
//! in place.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tessera_archive::{Archive, ModuleId, ModuleSpec};
use tessera_util::fs::{ensure_dir, remove_dir_all_if_exists, safe_join};

use crate::error::RepoError;
use crate::view::{ArchiveSummary, RepositorySummary, RepositoryView};

const META_FILE_NAME: &str = ".tessera-repo-meta.json";
const SPEC_FILE_NAME: &str = "moduleSpec.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMeta {
    create_time: i64,
    content_hash: String,
}

/// A filesystem-path repository: one subdirectory per module id, named by
/// the module id's canonical form, holding the archive's entries
/// extracted in place plus the spec file and a small sidecar recording
/// create-time and content hash for idempotency checks.
pub struct FilesystemRepository {
    root: PathBuf,
    output_dir: PathBuf,
    meta_cache: Mutex<BTreeMap<ModuleId, StoredMeta>>,
}

impl FilesystemRepository {
    /// Open (creating if absent) a filesystem repository rooted at `root`,
    /// materializing `get_script_archives` results under `output_dir`.
    ///
    /// # Errors
    /// Returns an error if `root` cannot be created or its existing
    /// contents cannot be read.
    pub fn open(root: PathBuf, output_dir: PathBuf) -> Result<Self, RepoError> {
        ensure_dir(&root)?;
        let repo = FilesystemRepository {
            root,
            output_dir,
            meta_cache: Mutex::new(BTreeMap::new()),
        };
        repo.reload_meta_cache()?;
        Ok(repo)
    }

    fn module_dir(&self, module_id: &ModuleId) -> PathBuf {
        self.root.join(module_id.canonical())
    }

    fn reload_meta_cache(&self) -> Result<(), RepoError> {
        let mut cache = self
            .meta_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        cache.clear();

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
            if !path.is_dir() {
                continue;
            }
            let meta_path = path.join(META_FILE_NAME);
            if !meta_path.exists() {
                continue;
            }
            let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(module_id) = dir_name.parse::<ModuleId>() else {
                continue;
            };
            let content = std::fs::read_to_string(&meta_path).map_err(|source| RepoError::Io {
                path: meta_path.display().to_string(),
                source,
            })?;
            if let Ok(meta) = serde_json::from_str::<StoredMeta>(&content) {
                cache.insert(module_id, meta);
            }
        }
        Ok(())
    }

    fn read_archive(&self, module_id: &ModuleId, dir: &Path) -> Result<Archive, RepoError> {
        let spec_path = dir.join(SPEC_FILE_NAME);
        let spec_json = std::fs::read_to_string(&spec_path).map_err(|source| RepoError::Io {
            path: spec_path.display().to_string(),
            source,
        })?;
        let spec = ModuleSpec::from_json(&spec_json, &spec_path.display().to_string())?;

        let relative_files = tessera_util::fs::collect_relative_files(dir)?;
        let mut entries = BTreeMap::new();
        for name in relative_files {
            if name == SPEC_FILE_NAME || name == META_FILE_NAME {
                continue;
            }
            let path = dir.join(&name);
            let bytes = std::fs::read(&path).map_err(|source| RepoError::Io {
                path: path.display().to_string(),
                source,
            })?;
            entries.insert(name, bytes);
        }

        let create_time = self
            .meta_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(module_id)
            .map(|meta| meta.create_time)
            .unwrap_or(0);

        Ok(Archive::new(spec, entries, create_time))
    }
}

impl crate::repository::Repository for FilesystemRepository {
    fn insert_archive(&self, archive: &Archive) -> Result<(), RepoError> {
        let module_id = archive.module_id().clone();
        let content_hash = archive.content_hash();

        {
            let cache = self
                .meta_cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(existing) = cache.get(&module_id) {
                if archive.create_time() <= existing.create_time {
                    return Ok(());
                }
            }
        }

        let dir = self.module_dir(&module_id);
        remove_dir_all_if_exists(&dir)?;
        ensure_dir(&dir)?;

        for name in archive.entry_names() {
            let Some(bytes) = archive.entry_bytes(name) else {
                continue; // unreachable: name came from entry_names()
            };
            let path = safe_join(&dir, name)?;
            if let Some(parent) = path.parent() {
                ensure_dir(parent)?;
            }
            std::fs::write(&path, bytes).map_err(|source| RepoError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }

        let spec_json = archive.spec().to_json()?;
        std::fs::write(dir.join(SPEC_FILE_NAME), spec_json).map_err(|source| RepoError::Io {
            path: dir.join(SPEC_FILE_NAME).display().to_string(),
            source,
        })?;

        let meta = StoredMeta {
            create_time: archive.create_time(),
            content_hash,
        };
        let meta_json = serde_json::to_string(&meta).map_err(|source| RepoError::Io {
            path: dir.join(META_FILE_NAME).display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, source),
        })?;
        std::fs::write(dir.join(META_FILE_NAME), meta_json).map_err(|source| RepoError::Io {
            path: dir.join(META_FILE_NAME).display().to_string(),
            source,
        })?;

        self.meta_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(module_id, meta);
        Ok(())
    }

    fn delete_archive(&self, module_id: &ModuleId) -> Result<(), RepoError> {
        remove_dir_all_if_exists(&self.module_dir(module_id))?;
        self.meta_cache
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
            let dir = self.module_dir(module_id);
            if !dir.is_dir() {
                continue;
            }
            let archive = self.read_archive(module_id, &dir)?;
            let dest = self.output_dir.join(module_id.canonical());
            remove_dir_all_if_exists(&dest)?;
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
        let cache = self
            .meta_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(Box::new(FilesystemView {
            entries: cache.clone(),
            recent_only: false,
        }))
    }

    fn get_view(&self, name: &str) -> Result<Box<dyn RepositoryView>, RepoError> {
        if name != "recent" {
            return Err(RepoError::UnsupportedView {
                name: name.to_owned(),
            });
        }
        let cache = self
            .meta_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(Box::new(FilesystemView {
            entries: cache.clone(),
            recent_only: true,
        }))
    }
}

struct FilesystemView {
    entries: BTreeMap<ModuleId, StoredMeta>,
    recent_only: bool,
}

impl FilesystemView {
    /// The "recent" view exposes only the 10 most recently updated modules.
    const RECENT_LIMIT: usize = 10;

    fn visible(&self) -> Vec<(&ModuleId, &StoredMeta)> {
        let mut all: Vec<(&ModuleId, &StoredMeta)> = self.entries.iter().collect();
        if self.recent_only {
            all.sort_by(|a, b| b.1.create_time.cmp(&a.1.create_time));
            all.truncate(Self::RECENT_LIMIT);
        }
        all
    }
}

impl RepositoryView for FilesystemView {
    fn archive_update_times(&self) -> BTreeMap<ModuleId, i64> {
        self.visible()
            .into_iter()
            .map(|(id, meta)| (id.clone(), meta.create_time))
            .collect()
    }

    fn repository_summary(&self) -> RepositorySummary {
        let visible = self.visible();
        RepositorySummary {
            module_count: visible.len(),
            latest_update_time: visible
                .iter()
                .map(|(_, meta)| meta.create_time)
                .max()
                .unwrap_or(0),
        }
    }

    fn archive_summaries(&self) -> Vec<ArchiveSummary> {
        self.visible()
            .into_iter()
            .map(|(id, meta)| ArchiveSummary {
                module_id: id.clone(),
                create_time: meta.create_time,
                content_hash: meta.content_hash.clone(),
            })
            .collect()
    }
}
