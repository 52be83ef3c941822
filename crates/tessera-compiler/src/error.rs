//! Error type for compiler plugin failures.

use tessera_archive::ModuleId;

/// A compiler plugin reported failure while compiling an archive.
#[derive(Debug, thiserror::Error)]
#[error("plugin \"{plugin_id}\" failed to compile {module_id}: {cause}")]
pub struct CompileError {
    pub plugin_id: String,
    pub module_id: ModuleId,
    pub cause: String,
}
