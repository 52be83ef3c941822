//! Error types for archive construction and spec parsing.

use tessera_util::UtilError;

/// Errors produced while building or reading archives.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive's contents could not be read or were structurally malformed.
    #[error("bad archive at {location}: {reason}")]
    BadArchive { location: String, reason: String },

    /// An archive entry would have escaped the archive's root when extracted.
    #[error("bad archive at {location}: entry escapes root: {source}")]
    PathEscape {
        location: String,
        #[source]
        source: UtilError,
    },

    /// The embedded module spec could not be parsed as JSON.
    #[error("cannot parse module spec in {location}: {source}")]
    SpecParseError {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    /// The module spec failed semantic validation (e.g. empty moduleId).
    #[error("invalid module spec in {location}: {reason}")]
    InvalidSpec { location: String, reason: String },

    /// An I/O error occurred while reading the archive source.
    #[error("cannot read {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Util(#[from] UtilError),
}
