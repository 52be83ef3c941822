//! Error types for the module graph and loader.

use tessera_archive::ModuleId;
use tessera_compiler::CompileError;

/// Errors produced while updating or querying the module graph.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// A declared dependency was not present among the just-updated
    /// revisions in this batch nor in the current revision table.
    #[error("{module_id} declares a dependency on {dependency} which is not loaded")]
    UnresolvedDependency {
        module_id: ModuleId,
        dependency: ModuleId,
    },

    /// The batch contains a dependency cycle among its own archives.
    #[error("dependency cycle in batch: {}", cycle.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "))]
    CycleError { cycle: Vec<ModuleId> },

    /// A compiler plugin failed to compile an archive.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A dependent module could not be rewired after one of its
    /// dependencies was upgraded or removed.
    #[error("cannot relink {module_id}: {cause}")]
    RelinkError { module_id: ModuleId, cause: String },
}
