//! Queryable projections of a repository's contents.

use std::collections::BTreeMap;

use tessera_archive::ModuleId;

/// One archive's identity and metadata, without its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub module_id: ModuleId,
    pub create_time: i64,
    pub content_hash: String,
}

/// Aggregate counters over a repository (or view).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepositorySummary {
    pub module_count: usize,
    pub latest_update_time: i64,
}

/// A queryable projection of a repository's contents.
///
/// The default view (returned by every [`crate::repository::Repository`])
/// exposes every stored archive; named views may project a subset.
pub trait RepositoryView: Send + Sync {
    /// Last-update time (epoch ms) per module id, the poller's primary
    /// input.
    fn archive_update_times(&self) -> BTreeMap<ModuleId, i64>;

    fn repository_summary(&self) -> RepositorySummary;

    fn archive_summaries(&self) -> Vec<ArchiveSummary>;
}
