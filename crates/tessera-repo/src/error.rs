//! Error types for the persistence gateway and sharded remote repository.

use tessera_archive::{ArchiveError, ModuleId};

/// Errors produced by a [`crate::repository::Repository`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The requested named view is not supported by this repository.
    #[error("repository does not support view \"{name}\"")]
    UnsupportedView { name: String },

    /// The requested operation (e.g. deploy-spec storage) is not supported.
    #[error("repository does not support operation \"{operation}\"")]
    UnsupportedOperation { operation: String },

    /// A stored archive's payload did not match its recorded content hash.
    #[error("content hash mismatch for {module_id}: expected {expected}, got {actual}")]
    ContentHashMismatch {
        module_id: ModuleId,
        expected: String,
        actual: String,
    },

    /// A remote operation exceeded its deadline.
    #[error("operation on {module_id:?} timed out after {elapsed_ms}ms")]
    TimeoutError {
        module_id: Option<ModuleId>,
        elapsed_ms: u64,
    },

    /// An I/O error occurred while reading or writing archive storage.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Util(#[from] tessera_util::UtilError),
}
