//! Structured outcomes of a batch update or removal, returned to the
//! caller instead of raising per-archive failures as hard errors.

use tessera_archive::ModuleId;

use crate::error::LoaderError;

/// One archive's failure to join the revision table, alongside the
/// moduleId it would have occupied.
#[derive(Debug)]
pub struct ArchiveFailure {
    pub module_id: ModuleId,
    pub error: LoaderError,
}

/// A dependent that could not be relinked after one of its dependencies
/// was committed in this batch; its previous revision was preserved.
#[derive(Debug)]
pub struct RelinkFailure {
    pub module_id: ModuleId,
    pub error: LoaderError,
}

/// The outcome of one [`crate::loader::Loader::update_archives`] call.
///
/// Per-archive failures never abort the batch: an archive that fails to
/// resolve, compile, or relink is recorded here and the remaining archives
/// in the batch are still attempted.
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Module ids committed to a new revision, in commit (topological) order.
    pub committed: Vec<ModuleId>,
    /// Archives skipped because an equal-or-newer revision was already loaded.
    pub skipped_stale: Vec<ModuleId>,
    /// Archives skipped because no registered plugin would compile them.
    pub skipped_no_compiler: Vec<ModuleId>,
    /// Archives that failed to resolve their dependencies or to compile.
    pub failures: Vec<ArchiveFailure>,
    /// Already-loaded dependents that could not be relinked against a
    /// newly committed dependency; their previous revision is unchanged.
    pub relink_failures: Vec<RelinkFailure>,
}

impl UpdateReport {
    pub fn is_fully_successful(&self) -> bool {
        self.failures.is_empty() && self.relink_failures.is_empty()
    }
}

/// The outcome of a [`crate::loader::Loader::remove_module`] call.
#[derive(Debug, Default)]
pub struct RemoveReport {
    /// Module ids removed, in removal order: the requested module first,
    /// then any dependents cascaded out because they could no longer
    /// resolve a dependency.
    pub removed: Vec<ModuleId>,
}
