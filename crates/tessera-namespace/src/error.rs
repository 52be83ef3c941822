//! Error types for namespace construction and linking.

use tessera_archive::ModuleId;

/// Errors produced while wiring a module's namespace.
#[derive(Debug, thiserror::Error)]
pub enum NamespaceError {
    /// A declared dependency could not be resolved to a live namespace.
    #[error("unresolved dependency {dependency} of {module_id}")]
    UnresolvedDependency {
        module_id: ModuleId,
        dependency: ModuleId,
    },
}
