//! The runtime module: a compiled, linked, revisioned unit owned by the
//! loader's revision table.

use std::collections::BTreeSet;
use std::sync::Arc;

use tessera_archive::ModuleSpec;
use tessera_namespace::Namespace;

/// A live revision of a module: the result of compiling one archive and
/// linking its namespace against its dependencies' current namespaces.
///
/// The loader is the sole owner of every `Module` it hands out; consumers
/// retrieve `Arc<Module>` snapshots from [`crate::loader::Loader::get_module`]
/// that remain valid even after a later upgrade replaces the loader's own
/// table entry.
pub struct Module {
    pub(crate) spec: ModuleSpec,
    pub(crate) namespace: Arc<Namespace>,
    pub(crate) symbols: BTreeSet<String>,
    pub(crate) archive_create_time: i64,
    pub(crate) revision: u64,
    pub(crate) loaded_at: i64,
}

impl Module {
    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// The symbol names the compiler reported publishing for this module.
    /// Advisory: the namespace itself is authoritative for resolution (see
    /// `DESIGN.md` on the compiler return-set open question).
    pub fn symbols(&self) -> &BTreeSet<String> {
        &self.symbols
    }

    /// The `createTime` of the archive this revision was built from, used
    /// by the loader's freshness check on the next update.
    pub fn archive_create_time(&self) -> i64 {
        self.archive_create_time
    }

    /// Monotonically increasing per-moduleId revision number. A relink
    /// that does not recompile keeps its dependent's existing number —
    /// only a successful compile allocates a new one.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Epoch-ms timestamp this revision was committed (or, for a relinked
    /// module, when it was originally compiled — relinking does not bump
    /// this).
    pub fn loaded_at(&self) -> i64 {
        self.loaded_at
    }
}
