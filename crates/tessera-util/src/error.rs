//! Error types shared by the module-loading crates.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A glob pattern was invalid.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    GlobPattern { pattern: String, message: String },

    /// A destination path would have escaped its intended root.
    #[error("entry \"{entry}\" would escape root {root}")]
    PathEscape { entry: String, root: String },

    /// A content hash did not match the expected value.
    #[error("content hash mismatch for {path} — expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },
}
