//! The compiler plugin contract.

use std::collections::BTreeSet;
use std::path::Path;

use tessera_archive::Archive;
use tessera_namespace::Namespace;

use crate::error::CompileError;

/// A compiler translates an archive's contents into symbols published into
/// a module's namespace.
///
/// Implementations must be pure with respect to the namespace they are
/// given: they publish symbols into it and may read from it (to resolve
/// dependency symbols while compiling, if their language needs that), but
/// must hold no state of their own that would make two calls to `compile`
/// for the same archive behave differently.
pub trait Compiler: Send + Sync {
    /// This plugin's stable identifier, matched against a module spec's
    /// `compilerPluginIds`.
    fn plugin_id(&self) -> &str;

    /// Whether this compiler should handle `archive`. The default
    /// implementation checks whether the archive's spec names this
    /// plugin's id.
    fn should_compile(&self, archive: &Archive) -> bool {
        archive
            .spec()
            .compiler_plugin_ids
            .contains(self.plugin_id())
    }

    /// Compile `archive`, publishing symbols into `namespace`. `workdir` is
    /// a scratch directory unique to this compile, usable for
    /// intermediates; it is not persisted across compiles.
    ///
    /// # Errors
    /// Returns [`CompileError`] on any compilation failure, carrying this
    /// plugin's id, the archive's module id, and a cause.
    fn compile(
        &self,
        archive: &Archive,
        namespace: &mut Namespace,
        workdir: &Path,
    ) -> Result<BTreeSet<String>, CompileError>;
}
