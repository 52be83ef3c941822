//! Archive model, spec codec, and archive sources (path, jar).
#![forbid(unsafe_code)]

pub mod archive;
pub mod error;
pub mod jar_archive;
pub mod module_id;
pub mod path_archive;
pub mod spec;

pub use archive::Archive;
pub use error::ArchiveError;
pub use jar_archive::{build_jar_archive, JarArchiveOptions};
pub use module_id::{ModuleId, RevisionId};
pub use path_archive::{build_path_archive, PathArchiveOptions};
pub use spec::ModuleSpec;
