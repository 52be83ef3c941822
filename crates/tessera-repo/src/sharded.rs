//! The sharded remote repository: module archives spread across a fixed
//! number of shards of an external datastore, polled and fetched in
//! parallel.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Mutex;

use rayon::prelude::*;
use tessera_archive::{Archive, ArchiveError, ModuleId, ModuleSpec};
use tessera_util::fs::{ensure_dir, remove_dir_all_if_exists, safe_join};
use tessera_util::hash::sha1_bytes;

use crate::error::RepoError;
use crate::view::{ArchiveSummary, RepositorySummary, RepositoryView};

/// One row as stored by the remote datastore: a module id, its shard, the
/// serialized module spec, and the SHA-1 hash over the archive's content
/// (fixed to SHA-1, not SHA-256, for compatibility with rows already
/// written by this wire format).
#[derive(Debug, Clone)]
pub struct RemoteRow {
    pub module_id: ModuleId,
    pub update_time: i64,
    pub module_spec: String,
    pub archive_content_hash: String,
    pub archive_bytes: Vec<u8>,
}

/// The datastore driver a [`ShardedRemoteRepository`] fans calls out to.
/// The actual datastore (e.g. a distributed KV store) is out of scope;
/// this trait is the seam an implementation plugs into.
pub trait RemoteStore: Send + Sync {
    /// Fetch every row currently stored in `shard`.
    ///
    /// # Errors
    /// Returns an error if the shard cannot be reached.
    fn scan_shard(&self, shard: u32) -> Result<Vec<RemoteRow>, RepoError>;

    /// Fetch the row for a specific `module_id` from `shard`, if present.
    ///
    /// # Errors
    /// Returns an error if the shard cannot be reached.
    fn get_row(&self, shard: u32, module_id: &ModuleId) -> Result<Option<RemoteRow>, RepoError>;

    /// Write a row to `shard`.
    ///
    /// # Errors
    /// Returns an error if the shard cannot be reached.
    fn put_row(&self, shard: u32, row: RemoteRow) -> Result<(), RepoError>;

    /// Remove the row for `module_id` from `shard`, if present.
    ///
    /// # Errors
    /// Returns an error if the shard cannot be reached.
    fn delete_row(&self, shard: u32, module_id: &ModuleId) -> Result<(), RepoError>;
}

/// Deterministically assign a module id to one of `shard_count` shards.
///
/// The assignment is computed from the module id's canonical string form,
/// so it is stable across process restarts and independent of insertion
/// order.
pub fn shard_for(module_id: &ModuleId, shard_count: u32) -> u32 {
    assert!(shard_count > 0, "shard_count must be positive");
    let digest = sha1_bytes(module_id.canonical().as_bytes());
    let numeric = digest
        .get(..16)
        .and_then(|prefix| u64::from_str_radix(prefix, 16).ok())
        .unwrap_or(0);
    u32::try_from(numeric % u64::from(shard_count)).unwrap_or(0)
}

/// Produce a Fisher-Yates shuffle of `0..shard_count`, seeded from the
/// current time. There is no `rand` dependency in this workspace, so the
/// shuffle uses a small xorshift generator — good enough to spread polling
/// load across shards, not meant as a cryptographic or statistical PRNG.
fn shuffled_shard_order(shard_count: u32) -> Vec<u32> {
    let mut order: Vec<u32> = (0..shard_count).collect();
    let millis = u64::try_from(tessera_util::time::now_millis()).unwrap_or(0);
    let mut seed = millis ^ 0x9E37_79B9_7F4A_7C15;
    if seed == 0 {
        seed = 0xD1B5_4A32_D192_ED03;
    }
    for i in (1..order.len()).rev() {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let bound = u64::try_from(i).unwrap_or(0) + 1;
        let j = usize::try_from(seed % bound).unwrap_or(0);
        order.swap(i, j);
    }
    order
}

/// Encode an archive's entries into a single opaque payload: entry count,
/// then each entry as a length-prefixed name followed by length-prefixed
/// bytes, in name-sorted order (the same traversal `Archive::entry_names`
/// already gives). This is the format stored in a row's `archive_content`
/// column; it is internal wire framing, not part of the spec's JSON shapes.
fn encode_entries(archive: &Archive) -> Vec<u8> {
    let names: Vec<&str> = archive.entry_names().collect();
    let mut buf = Vec::new();
    buf.extend_from_slice(&u32::try_from(names.len()).unwrap_or(u32::MAX).to_le_bytes());
    for name in names {
        let bytes = archive.entry_bytes(name).unwrap_or(&[]);
        let name_bytes = name.as_bytes();
        buf.extend_from_slice(&u32::try_from(name_bytes.len()).unwrap_or(u32::MAX).to_le_bytes());
        buf.extend_from_slice(name_bytes);
        buf.extend_from_slice(&u32::try_from(bytes.len()).unwrap_or(u32::MAX).to_le_bytes());
        buf.extend_from_slice(bytes);
    }
    buf
}

fn decode_entries(bytes: &[u8], module_id: &ModuleId) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    let malformed = || ArchiveError::BadArchive {
        location: module_id.to_string(),
        reason: "truncated or malformed archive_content payload".to_owned(),
    };

    let mut cursor = bytes;
    let count = read_u32(&mut cursor).ok_or_else(malformed)?;
    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let name_len = read_u32(&mut cursor).ok_or_else(malformed)?;
        let name_bytes = take(&mut cursor, name_len).ok_or_else(malformed)?;
        let name = String::from_utf8(name_bytes.to_vec()).map_err(|_| malformed())?;
        let data_len = read_u32(&mut cursor).ok_or_else(malformed)?;
        let data = take(&mut cursor, data_len).ok_or_else(malformed)?;
        entries.insert(name, data.to_vec());
    }
    Ok(entries)
}

fn read_u32(cursor: &mut &[u8]) -> Option<u32> {
    let head = take(cursor, 4)?;
    let array: [u8; 4] = head.try_into().ok()?;
    Some(u32::from_le_bytes(array))
}

fn take<'a>(cursor: &mut &'a [u8], len: u32) -> Option<&'a [u8]> {
    let len = usize::try_from(len).ok()?;
    let head = cursor.get(..len)?;
    let tail = cursor.get(len..)?;
    *cursor = tail;
    Some(head)
}

/// A repository backed by a fixed number of shards of a [`RemoteStore`].
///
/// Polling and batched fetch fan out across shards with `rayon`, a fetched
/// row whose content does not hash to its recorded `archive_content_hash`
/// is skipped rather than treated as a fatal error (a torn write on the
/// remote side should not take down an entire poll), and fetches are
/// chunked to `fetch_batch_size` rows per round rather than issued as one
/// unbounded fan-out, per spec §4.G / §6.
pub struct ShardedRemoteRepository<S: RemoteStore> {
    store: S,
    shard_count: u32,
    fetch_batch_size: u32,
    output_dir: PathBuf,
    skipped: Mutex<Vec<ModuleId>>,
}

impl<S: RemoteStore> ShardedRemoteRepository<S> {
    pub fn new(store: S, shard_count: u32, fetch_batch_size: u32, output_dir: PathBuf) -> Self {
        ShardedRemoteRepository {
            store,
            shard_count,
            fetch_batch_size,
            output_dir,
            skipped: Mutex::new(Vec::new()),
        }
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn fetch_batch_size(&self) -> u32 {
        self.fetch_batch_size
    }

    fn shard_of(&self, module_id: &ModuleId) -> u32 {
        shard_for(module_id, self.shard_count)
    }

    /// Module ids whose most recent fetch was skipped due to a content
    /// hash mismatch, cleared on each call.
    pub fn take_skipped(&self) -> Vec<ModuleId> {
        std::mem::take(
            &mut self
                .skipped
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    fn scan_all(&self, shard_order: &[u32]) -> Result<Vec<RemoteRow>, RepoError> {
        let rows: Vec<Vec<RemoteRow>> = shard_order
            .par_iter()
            .map(|&shard| self.store.scan_shard(shard))
            .collect::<Result<_, RepoError>>()?;
        Ok(rows.into_iter().flatten().collect())
    }

    /// Poll every shard for its current `(moduleId, last_update)` rows, in
    /// a shard order randomized per call to spread scan load, used by the
    /// poller to compute `archive_update_times` for this repository.
    ///
    /// # Errors
    /// Returns an error if any shard scan fails.
    pub fn poll_all(&self) -> Result<BTreeMap<ModuleId, i64>, RepoError> {
        let order = shuffled_shard_order(self.shard_count);
        Ok(self
            .scan_all(&order)?
            .into_iter()
            .map(|row| (row.module_id, row.update_time))
            .collect())
    }

    /// Fetch full rows for `module_ids`, chunked to at most
    /// `fetch_batch_size` lookups fanned out in parallel per round. A row
    /// whose content does not match its recorded hash is recorded via
    /// [`Self::take_skipped`] and excluded from the result.
    ///
    /// # Errors
    /// Returns an error if a shard cannot be reached at all.
    fn fetch_rows(&self, module_ids: &BTreeSet<ModuleId>) -> Result<BTreeMap<ModuleId, RemoteRow>, RepoError> {
        let ids: Vec<ModuleId> = module_ids.iter().cloned().collect();
        let chunk_size = usize::try_from(self.fetch_batch_size).unwrap_or(1).max(1);

        let mut result = BTreeMap::new();
        let mut skipped = Vec::new();
        for chunk in ids.chunks(chunk_size) {
            let fetched: Vec<(ModuleId, Option<RemoteRow>)> = chunk
                .par_iter()
                .map(|module_id| {
                    let shard = self.shard_of(module_id);
                    self.store.get_row(shard, module_id).map(|row| (module_id.clone(), row))
                })
                .collect::<Result<_, RepoError>>()?;

            for (module_id, row) in fetched {
                let Some(row) = row else { continue };
                let actual = sha1_bytes(&row.archive_bytes);
                if actual == row.archive_content_hash {
                    result.insert(module_id, row);
                } else {
                    skipped.push(module_id);
                }
            }
        }

        if !skipped.is_empty() {
            self.skipped
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .extend(skipped);
        }

        Ok(result)
    }

    /// Fetch every module's raw archive content in `module_ids`, chunked
    /// and hash-verified per [`Self::fetch_rows`].
    ///
    /// # Errors
    /// Returns an error if a shard cannot be reached at all.
    pub fn fetch_batch(&self, module_ids: &BTreeSet<ModuleId>) -> Result<BTreeMap<ModuleId, Vec<u8>>, RepoError> {
        Ok(self
            .fetch_rows(module_ids)?
            .into_iter()
            .map(|(module_id, row)| (module_id, row.archive_bytes))
            .collect())
    }

    /// Store an already-encoded row directly, bypassing idempotency and
    /// spec encoding. Exposed for callers (and tests) that already hold a
    /// wire-shaped row; [`crate::repository::Repository::insert_archive`]
    /// is the idempotent, archive-level entry point.
    ///
    /// # Errors
    /// Returns an error if the destination shard cannot be reached.
    pub fn put_row(&self, row: RemoteRow) -> Result<(), RepoError> {
        let shard = self.shard_of(&row.module_id);
        self.store.put_row(shard, row)
    }
}

impl<S: RemoteStore> crate::repository::Repository for ShardedRemoteRepository<S> {
    fn insert_archive(&self, archive: &Archive) -> Result<(), RepoError> {
        let module_id = archive.module_id().clone();
        let shard = self.shard_of(&module_id);

        if let Some(existing) = self.store.get_row(shard, &module_id)? {
            if archive.create_time() <= existing.update_time {
                return Ok(());
            }
        }

        let archive_bytes = encode_entries(archive);
        let archive_content_hash = sha1_bytes(&archive_bytes);
        let module_spec = archive.spec().to_json()?;
        self.store.put_row(
            shard,
            RemoteRow {
                module_id,
                update_time: archive.create_time(),
                module_spec,
                archive_content_hash,
                archive_bytes,
            },
        )
    }

    fn delete_archive(&self, module_id: &ModuleId) -> Result<(), RepoError> {
        let shard = self.shard_of(module_id);
        self.store.delete_row(shard, module_id)
    }

    fn get_script_archives(
        &self,
        module_ids: &BTreeSet<ModuleId>,
    ) -> Result<BTreeMap<ModuleId, Archive>, RepoError> {
        ensure_dir(&self.output_dir)?;
        let rows = self.fetch_rows(module_ids)?;

        let mut found = BTreeMap::new();
        for (module_id, row) in rows {
            let spec = ModuleSpec::from_json(&row.module_spec, &module_id.to_string())?;
            let entries = decode_entries(&row.archive_bytes, &module_id)?;
            let archive = Archive::new(spec, entries, row.update_time);

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
            found.insert(module_id, archive);
        }
        Ok(found)
    }

    fn get_default_view(&self) -> Result<Box<dyn RepositoryView>, RepoError> {
        let order: Vec<u32> = (0..self.shard_count).collect();
        Ok(Box::new(ShardedView {
            rows: self.scan_all(&order)?,
        }))
    }
}

struct ShardedView {
    rows: Vec<RemoteRow>,
}

impl RepositoryView for ShardedView {
    fn archive_update_times(&self) -> BTreeMap<ModuleId, i64> {
        self.rows
            .iter()
            .map(|row| (row.module_id.clone(), row.update_time))
            .collect()
    }

    fn repository_summary(&self) -> RepositorySummary {
        RepositorySummary {
            module_count: self.rows.len(),
            latest_update_time: self.rows.iter().map(|row| row.update_time).max().unwrap_or(0),
        }
    }

    fn archive_summaries(&self) -> Vec<ArchiveSummary> {
        self.rows
            .iter()
            .map(|row| ArchiveSummary {
                module_id: row.module_id.clone(),
                create_time: row.update_time,
                content_hash: row.archive_content_hash.clone(),
            })
            .collect()
    }
}
