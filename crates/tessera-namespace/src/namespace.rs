//! Per-module symbol namespace with an explicit parent chain and filtered
//! dependency imports/exports.

use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_archive::ModuleId;

use crate::filter::PackageFilter;

/// A single published symbol's payload. Compiler plugins publish opaque
/// byte payloads (compiled bytecode, a resolved resource, a descriptor);
/// the namespace never interprets them.
pub type SymbolBytes = Arc<[u8]>;

/// One resolvable dependency edge: the exporting module's namespace, the
/// importer's own filter on it, declared in the order the importer's spec
/// listed its dependencies (resolution tries edges in this order, first
/// match wins).
#[derive(Clone)]
struct DependencyLink {
    module_id: ModuleId,
    namespace: Arc<Namespace>,
    import_filter: PackageFilter,
}

/// An isolated, filtered symbol-resolution scope.
///
/// Namespaces form a parent chain (bootstrap → app-package filter → each
/// module) plus, per module, a set of direct dependency edges resolved at
/// link time. A namespace never owns its dependency namespaces — it holds
/// `Arc` snapshots taken when it was built and is discarded and rebuilt
/// wholesale on relink, rather than holding a pointer that could dangle.
pub struct Namespace {
    local: BTreeMap<String, SymbolBytes>,
    export_filter: PackageFilter,
    dependencies: Vec<DependencyLink>,
    parent: Option<Arc<Namespace>>,
}

/// A symbol resolved to its defining namespace and payload.
pub struct Resolved {
    pub bytes: SymbolBytes,
}

impl Namespace {
    /// Build a root (bootstrap) namespace with no parent and no
    /// dependencies, exporting `export_filter` to its children.
    pub fn root(local: BTreeMap<String, SymbolBytes>, export_filter: PackageFilter) -> Self {
        Namespace {
            local,
            export_filter,
            dependencies: Vec::new(),
            parent: None,
        }
    }

    /// Build a namespace for a module: a local symbol table, the set of
    /// filters to expose to dependents, a resolved list of direct
    /// dependency namespaces (in declaration order), and a parent.
    pub fn for_module(
        local: BTreeMap<String, SymbolBytes>,
        export_filter: PackageFilter,
        dependencies: Vec<(ModuleId, Arc<Namespace>, PackageFilter)>,
        parent: Arc<Namespace>,
    ) -> Self {
        Namespace {
            local,
            export_filter,
            dependencies: dependencies
                .into_iter()
                .map(|(module_id, namespace, import_filter)| DependencyLink {
                    module_id,
                    namespace,
                    import_filter,
                })
                .collect(),
            parent: Some(parent),
        }
    }

    pub fn export_filter(&self) -> &PackageFilter {
        &self.export_filter
    }

    /// Register one symbol. The fast path used by bytecode-loading
    /// compiler plugins that discover and publish symbols one at a time.
    pub fn register_symbol(&mut self, name: impl Into<String>, bytes: SymbolBytes) {
        self.local.insert(name.into(), bytes);
    }

    /// Register a whole batch of symbols at once, used after a
    /// source-compiling plugin has written its artifacts to disk.
    pub fn add_symbols(&mut self, symbols: BTreeMap<String, SymbolBytes>) {
        self.local.extend(symbols);
    }

    /// Names of every symbol published directly in this namespace (not
    /// including dependencies or the parent chain).
    pub fn local_symbol_names(&self) -> impl Iterator<Item = &str> {
        self.local.keys().map(String::as_str)
    }

    /// A clone of this namespace's local symbol table, used to carry a
    /// module's compiled symbols over into a rebuilt namespace on relink
    /// without recompiling. Cheap: values are `Arc`-shared payloads.
    pub fn local_snapshot(&self) -> BTreeMap<String, SymbolBytes> {
        self.local.clone()
    }

    /// Resolve `name` following local → direct-dep exports (declaration
    /// order, first match wins) → parent chain.
    pub fn resolve(&self, name: &str) -> Option<Resolved> {
        if let Some(bytes) = self.local.get(name) {
            return Some(Resolved {
                bytes: bytes.clone(),
            });
        }

        for link in &self.dependencies {
            if link.import_filter.matches(name) && link.namespace.export_filter.matches(name) {
                if let Some(bytes) = link.namespace.local.get(name) {
                    return Some(Resolved {
                        bytes: bytes.clone(),
                    });
                }
            }
        }

        self.parent.as_ref().and_then(|parent| parent.resolve(name))
    }

    /// Module ids of direct dependencies this namespace was linked against,
    /// in declaration order.
    pub fn dependency_ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.dependencies.iter().map(|link| &link.module_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> SymbolBytes {
        Arc::from(s.as_bytes())
    }

    fn leaf_module_id(name: &str) -> ModuleId {
        ModuleId::new(name, "v1").unwrap()
    }

    #[test]
    fn resolves_local_symbol_first() {
        let mut local = BTreeMap::new();
        local.insert("Hello".to_owned(), bytes("local"));
        let ns = Namespace::root(local, PackageFilter::all());
        let resolved = ns.resolve("Hello").unwrap();
        assert_eq!(&*resolved.bytes, b"local");
    }

    #[test]
    fn missing_symbol_resolves_to_none() {
        let ns = Namespace::root(BTreeMap::new(), PackageFilter::all());
        assert!(ns.resolve("Nope").is_none());
    }

    #[test]
    fn resolves_through_matching_dependency_export() {
        let mut dep_local = BTreeMap::new();
        dep_local.insert("com.dep.Thing".to_owned(), bytes("dep"));
        let dep_ns = Arc::new(Namespace::root(
            dep_local,
            PackageFilter::new(vec!["com.dep.*".to_owned()]),
        ));

        let root = Arc::new(Namespace::root(BTreeMap::new(), PackageFilter::all()));
        let app_ns = Namespace::for_module(
            BTreeMap::new(),
            PackageFilter::default(),
            vec![(
                leaf_module_id("dep"),
                dep_ns,
                PackageFilter::new(vec!["com.dep.*".to_owned()]),
            )],
            root,
        );

        let resolved = app_ns.resolve("com.dep.Thing").unwrap();
        assert_eq!(&*resolved.bytes, b"dep");
    }

    #[test]
    fn import_filter_must_match_for_dependency_symbol_to_resolve() {
        let mut dep_local = BTreeMap::new();
        dep_local.insert("com.dep.Thing".to_owned(), bytes("dep"));
        let dep_ns = Arc::new(Namespace::root(
            dep_local,
            PackageFilter::new(vec!["com.dep.*".to_owned()]),
        ));

        let root = Arc::new(Namespace::root(BTreeMap::new(), PackageFilter::all()));
        // Importer's own filter does not cover com.dep.*
        let app_ns = Namespace::for_module(
            BTreeMap::new(),
            PackageFilter::default(),
            vec![(
                leaf_module_id("dep"),
                dep_ns,
                PackageFilter::new(vec!["com.other.*".to_owned()]),
            )],
            root,
        );

        assert!(app_ns.resolve("com.dep.Thing").is_none());
    }

    #[test]
    fn export_filter_must_match_for_dependency_symbol_to_resolve() {
        let mut dep_local = BTreeMap::new();
        dep_local.insert("com.dep.Thing".to_owned(), bytes("dep"));
        // Dependency does not export this package at all.
        let dep_ns = Arc::new(Namespace::root(dep_local, PackageFilter::default()));

        let root = Arc::new(Namespace::root(BTreeMap::new(), PackageFilter::all()));
        let app_ns = Namespace::for_module(
            BTreeMap::new(),
            PackageFilter::default(),
            vec![(
                leaf_module_id("dep"),
                dep_ns,
                PackageFilter::new(vec!["com.dep.*".to_owned()]),
            )],
            root,
        );

        assert!(app_ns.resolve("com.dep.Thing").is_none());
    }

    #[test]
    fn falls_back_to_parent_chain() {
        let mut parent_local = BTreeMap::new();
        parent_local.insert("core.Unit".to_owned(), bytes("platform"));
        let parent = Arc::new(Namespace::root(parent_local, PackageFilter::all()));

        let child = Namespace::for_module(
            BTreeMap::new(),
            PackageFilter::default(),
            Vec::new(),
            parent,
        );

        let resolved = child.resolve("core.Unit").unwrap();
        assert_eq!(&*resolved.bytes, b"platform");
    }

    #[test]
    fn local_symbol_shadows_dependency_and_parent() {
        let mut dep_local = BTreeMap::new();
        dep_local.insert("Shared".to_owned(), bytes("from-dep"));
        let dep_ns = Arc::new(Namespace::root(dep_local, PackageFilter::all()));
        let parent = Arc::new(Namespace::root(BTreeMap::new(), PackageFilter::all()));

        let mut local = BTreeMap::new();
        local.insert("Shared".to_owned(), bytes("local-wins"));
        let ns = Namespace::for_module(
            local,
            PackageFilter::default(),
            vec![(leaf_module_id("dep"), dep_ns, PackageFilter::all())],
            parent,
        );

        let resolved = ns.resolve("Shared").unwrap();
        assert_eq!(&*resolved.bytes, b"local-wins");
    }

    #[test]
    fn first_matching_dependency_in_declaration_order_wins() {
        let mut first_local = BTreeMap::new();
        first_local.insert("Thing".to_owned(), bytes("first"));
        let first_ns = Arc::new(Namespace::root(first_local, PackageFilter::all()));

        let mut second_local = BTreeMap::new();
        second_local.insert("Thing".to_owned(), bytes("second"));
        let second_ns = Arc::new(Namespace::root(second_local, PackageFilter::all()));

        let parent = Arc::new(Namespace::root(BTreeMap::new(), PackageFilter::all()));
        let ns = Namespace::for_module(
            BTreeMap::new(),
            PackageFilter::default(),
            vec![
                (leaf_module_id("first"), first_ns, PackageFilter::all()),
                (leaf_module_id("second"), second_ns, PackageFilter::all()),
            ],
            parent,
        );

        let resolved = ns.resolve("Thing").unwrap();
        assert_eq!(&*resolved.bytes, b"first");
    }

    #[test]
    fn local_snapshot_carries_local_symbols_only() {
        let mut dep_local = BTreeMap::new();
        dep_local.insert("com.dep.Thing".to_owned(), bytes("dep"));
        let dep_ns = Arc::new(Namespace::root(dep_local, PackageFilter::all()));

        let mut local = BTreeMap::new();
        local.insert("Local".to_owned(), bytes("local"));
        let ns = Namespace::for_module(
            local,
            PackageFilter::default(),
            vec![(leaf_module_id("dep"), dep_ns, PackageFilter::all())],
            Arc::new(Namespace::root(BTreeMap::new(), PackageFilter::all())),
        );

        let snapshot = ns.local_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("Local"));
    }

    #[test]
    fn add_symbols_bulk_registers() {
        let mut ns = Namespace::root(BTreeMap::new(), PackageFilter::all());
        let mut batch = BTreeMap::new();
        batch.insert("A".to_owned(), bytes("a"));
        batch.insert("B".to_owned(), bytes("b"));
        ns.add_symbols(batch);
        assert!(ns.resolve("A").is_some());
        assert!(ns.resolve("B").is_some());
    }
}
