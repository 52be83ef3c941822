//! The module graph and loader: the mutable store of currently-reachable
//! module revisions, and the batch update/removal algorithm that keeps it
//! acyclic and fully linked.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tessera_archive::{Archive, ModuleId, ModuleSpec};
use tessera_compiler::{CompileError, PluginTable};
use tessera_namespace::{Namespace, PackageFilter, SymbolBytes};

use crate::error::LoaderError;
use crate::listener::ModuleListener;
use crate::module::Module;
use crate::report::{ArchiveFailure, RelinkFailure, RemoveReport, UpdateReport};

/// Configuration fixed for a loader's lifetime: the platform symbols hosted
/// at the root of every namespace's parent chain, the filter selecting which
/// of those symbols this process's modules may see, and the installed
/// compiler plugins.
///
/// The spec's bootstrap-namespace-then-app-package-filter chain is realized
/// here as a single filtered root namespace built once at construction,
/// rather than as two separate namespace objects: the platform symbol set is
/// static for the loader's lifetime, so there is nothing gained by deferring
/// the filter to resolution time (see `DESIGN.md`).
pub struct LoaderConfig {
    pub platform_symbols: BTreeMap<String, SymbolBytes>,
    pub app_package_filter: PackageFilter,
    pub plugins: PluginTable,
}

#[derive(Default)]
struct WriteState {
    revisions: BTreeMap<ModuleId, Arc<Module>>,
    /// moduleId -> set of moduleIds that declare a dependency on it, kept in
    /// sync with `revisions` on every commit and removal.
    reverse_deps: BTreeMap<ModuleId, BTreeSet<ModuleId>>,
    next_revision: BTreeMap<ModuleId, u64>,
}

/// The module graph: a concurrent store of currently-reachable module
/// revisions plus the operations (`update_archives`, `remove_module`) that
/// mutate it.
///
/// Writers serialize through a single lock (`write_lock`); readers
/// (`get_module`, iteration) go through a separately published `Arc`
/// snapshot and never block on a writer mid-batch. See `DESIGN.md`'s
/// concurrency section.
pub struct Loader {
    plugins: PluginTable,
    root: Arc<Namespace>,
    write_lock: Mutex<WriteState>,
    published: RwLock<Arc<BTreeMap<ModuleId, Arc<Module>>>>,
    listeners: Mutex<Vec<Weak<dyn ModuleListener>>>,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        let LoaderConfig {
            platform_symbols,
            app_package_filter,
            plugins,
        } = config;
        let filtered = platform_symbols
            .into_iter()
            .filter(|(name, _)| app_package_filter.matches(name))
            .collect();
        let root = Arc::new(Namespace::root(filtered, PackageFilter::all()));
        Loader {
            plugins,
            root,
            write_lock: Mutex::new(WriteState::default()),
            published: RwLock::new(Arc::new(BTreeMap::new())),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The currently reachable revision of `module_id`, or `None` if it is
    /// not loaded.
    pub fn get_module(&self, module_id: &ModuleId) -> Option<Arc<Module>> {
        self.published
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(module_id)
            .cloned()
    }

    /// A snapshot of every currently reachable module, in moduleId order.
    pub fn modules(&self) -> Vec<(ModuleId, Arc<Module>)> {
        self.published
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|(id, module)| (id.clone(), module.clone()))
            .collect()
    }

    pub fn add_listener(&self, listener: Weak<dyn ModuleListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(listener);
    }

    pub fn remove_listener(&self, listener: &Weak<dyn ModuleListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|existing| !existing.ptr_eq(listener));
    }

    /// Apply a batch of archives: freshen the revision table, compile and
    /// link every archive that needs it, and relink already-loaded
    /// dependents against the new revisions.
    ///
    /// Per-archive failures (unresolved dependency, compile failure, relink
    /// failure) never abort the batch — they are recorded in the returned
    /// [`UpdateReport`] and the rest of the batch proceeds. The only error
    /// this returns is a dependency cycle confined to the batch itself,
    /// which aborts before anything is committed.
    ///
    /// # Errors
    /// Returns [`LoaderError::CycleError`] if the batch's own archives form
    /// a dependency cycle.
    pub fn update_archives(&self, archives: Vec<Archive>) -> Result<UpdateReport, LoaderError> {
        let mut state = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut report = UpdateReport::default();

        let mut candidates = Vec::with_capacity(archives.len());
        for archive in archives {
            let stale = state
                .revisions
                .get(archive.module_id())
                .is_some_and(|current| current.archive_create_time() >= archive.create_time());
            if stale {
                report.skipped_stale.push(archive.module_id().clone());
            } else {
                candidates.push(archive);
            }
        }

        let order = crate::topo::topological_order(&candidates)?;

        let mut batch_committed: BTreeMap<ModuleId, Arc<Module>> = BTreeMap::new();
        let mut commit_order: Vec<(ModuleId, Arc<Module>)> = Vec::new();

        for index in order {
            let Some(archive) = candidates.get(index) else {
                continue; // unreachable: `order` only contains valid indices
            };
            let module_id = archive.module_id().clone();

            let dep_links = match resolve_dependency_links(archive.spec(), &batch_committed, &state.revisions)
            {
                Ok(links) => links,
                Err(dependency) => {
                    report.failures.push(ArchiveFailure {
                        module_id: module_id.clone(),
                        error: LoaderError::UnresolvedDependency { module_id, dependency },
                    });
                    continue;
                }
            };

            let Some(plugin) = self.plugins.select(archive) else {
                report.skipped_no_compiler.push(module_id);
                continue;
            };

            let export_filter = PackageFilter::new(archive.spec().export_package_filters.clone());
            let mut namespace =
                Namespace::for_module(BTreeMap::new(), export_filter, dep_links, self.root.clone());

            let workdir = match tempfile::tempdir() {
                Ok(dir) => dir,
                Err(source) => {
                    report.failures.push(ArchiveFailure {
                        module_id: module_id.clone(),
                        error: LoaderError::Compile(CompileError {
                            plugin_id: plugin.plugin_id().to_owned(),
                            module_id,
                            cause: format!("cannot create compile workdir: {source}"),
                        }),
                    });
                    continue;
                }
            };

            match plugin.compile(archive, &mut namespace, workdir.path()) {
                Ok(symbols) => {
                    let revision = next_revision(&mut state.next_revision, &module_id);
                    let module = Arc::new(Module {
                        spec: archive.spec().clone(),
                        namespace: Arc::new(namespace),
                        symbols,
                        archive_create_time: archive.create_time(),
                        revision,
                        loaded_at: tessera_util::time::now_millis(),
                    });
                    batch_committed.insert(module_id.clone(), module.clone());
                    commit_order.push((module_id, module));
                }
                Err(source) => {
                    report.failures.push(ArchiveFailure {
                        module_id,
                        error: LoaderError::Compile(source),
                    });
                }
            }
        }

        let mut update_notifications = Vec::with_capacity(commit_order.len());
        for (module_id, module) in commit_order {
            let old = state.revisions.get(&module_id).cloned();
            if let Some(old) = &old {
                for dep in &old.spec.module_dependencies {
                    if let Some(dependents) = state.reverse_deps.get_mut(dep) {
                        dependents.remove(&module_id);
                    }
                }
            }
            for dep in &module.spec.module_dependencies {
                state
                    .reverse_deps
                    .entry(dep.clone())
                    .or_default()
                    .insert(module_id.clone());
            }
            report.committed.push(module_id.clone());
            state.revisions.insert(module_id, module.clone());
            update_notifications.push((old, module));
        }

        let mut relink_notifications = Vec::new();
        let mut relinked: BTreeSet<ModuleId> = BTreeSet::new();
        for (module_id, _) in &update_notifications {
            let Some(dependents) = state.reverse_deps.get(module_id).cloned() else {
                continue;
            };
            for dependent_id in dependents {
                if batch_committed.contains_key(&dependent_id) || relinked.contains(&dependent_id) {
                    continue;
                }
                let Some(dependent) = state.revisions.get(&dependent_id).cloned() else {
                    continue;
                };
                match relink(&self.root, &dependent, &state.revisions) {
                    Ok(new_revision) => {
                        state.revisions.insert(dependent_id.clone(), new_revision.clone());
                        relinked.insert(dependent_id);
                        relink_notifications.push((dependent, new_revision));
                    }
                    Err(error) => {
                        report.relink_failures.push(RelinkFailure { module_id: dependent_id, error });
                    }
                }
            }
        }

        let snapshot = state.revisions.clone();
        *self.published.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(snapshot);
        drop(state);

        for (old, new) in &update_notifications {
            self.dispatch(|listener| listener.module_updated(old.as_deref(), new));
        }
        for (old, new) in &relink_notifications {
            self.dispatch(|listener| listener.module_updated(Some(old), new));
        }

        Ok(report)
    }

    /// Remove `module_id` and cascade to any dependent that cannot be
    /// relinked without it — unlike [`Loader::update_archives`], a relink
    /// failure here removes the dependent rather than preserving it, since
    /// there is no newer revision for it to fall back to.
    pub fn remove_module(&self, module_id: &ModuleId) -> RemoveReport {
        let mut state = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut report = RemoveReport::default();
        let mut removed_modules = Vec::new();
        let mut relink_notifications = Vec::new();

        let mut queue = VecDeque::from([module_id.clone()]);
        let mut queued: BTreeSet<ModuleId> = BTreeSet::from([module_id.clone()]);

        while let Some(id) = queue.pop_front() {
            let Some(old) = state.revisions.remove(&id) else {
                continue;
            };
            for dep in &old.spec.module_dependencies {
                if let Some(dependents) = state.reverse_deps.get_mut(dep) {
                    dependents.remove(&id);
                }
            }
            let dependents = state.reverse_deps.remove(&id).unwrap_or_default();
            for dependent_id in dependents {
                let Some(dependent) = state.revisions.get(&dependent_id).cloned() else {
                    continue;
                };
                match relink(&self.root, &dependent, &state.revisions) {
                    Ok(new_revision) => {
                        state.revisions.insert(dependent_id.clone(), new_revision.clone());
                        relink_notifications.push((dependent, new_revision));
                    }
                    Err(_) if queued.insert(dependent_id.clone()) => {
                        queue.push_back(dependent_id);
                    }
                    Err(_) => {}
                }
            }
            report.removed.push(id);
            removed_modules.push(old);
        }

        let snapshot = state.revisions.clone();
        *self.published.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(snapshot);
        drop(state);

        for (old, new) in &relink_notifications {
            self.dispatch(|listener| listener.module_updated(Some(old), new));
        }
        for old in &removed_modules {
            self.dispatch(|listener| listener.module_removed(old));
        }

        report
    }

    /// Notify every still-live listener, dropping any that have been
    /// dropped elsewhere. A listener that panics is caught and suppressed
    /// so it cannot abort the commit; the loader has no logging dependency
    /// to report the panic through (see `DESIGN.md`).
    fn dispatch<F: FnMut(&dyn ModuleListener)>(&self, mut action: F) {
        let mut listeners = self.listeners.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners.retain(|weak| {
            let Some(listener) = weak.upgrade() else {
                return false;
            };
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| action(listener.as_ref())));
            true
        });
    }
}

fn next_revision(next_revision: &mut BTreeMap<ModuleId, u64>, module_id: &ModuleId) -> u64 {
    let slot = next_revision.entry(module_id.clone()).or_insert(0);
    *slot = slot.saturating_add(1);
    *slot
}

/// Resolve every dependency `spec` declares against `batch_committed` first,
/// falling back to `current`. Returns the first unresolved dependency's id
/// as `Err` so the caller can attribute the failure.
fn resolve_dependency_links(
    spec: &ModuleSpec,
    batch_committed: &BTreeMap<ModuleId, Arc<Module>>,
    current: &BTreeMap<ModuleId, Arc<Module>>,
) -> Result<Vec<(ModuleId, Arc<Namespace>, PackageFilter)>, ModuleId> {
    let import_filter = PackageFilter::new(spec.import_package_filters.clone());
    let mut links = Vec::with_capacity(spec.module_dependencies.len());
    for dependency in &spec.module_dependencies {
        let resolved = batch_committed
            .get(dependency)
            .or_else(|| current.get(dependency));
        match resolved {
            Some(module) => links.push((dependency.clone(), module.namespace.clone(), import_filter.clone())),
            None => return Err(dependency.clone()),
        }
    }
    Ok(links)
}

/// Rebuild `dependent`'s namespace against `current`'s revisions without
/// recompiling, carrying its local symbols over as-is. Keeps the existing
/// revision number: only a successful compile allocates a new one.
fn relink(
    root: &Arc<Namespace>,
    dependent: &Arc<Module>,
    current: &BTreeMap<ModuleId, Arc<Module>>,
) -> Result<Arc<Module>, LoaderError> {
    let links = resolve_dependency_links(&dependent.spec, &BTreeMap::new(), current).map_err(|dependency| {
        LoaderError::RelinkError {
            module_id: dependent.spec.module_id.clone(),
            cause: format!("dependency {dependency} is no longer loaded"),
        }
    })?;
    let export_filter = PackageFilter::new(dependent.spec.export_package_filters.clone());
    let namespace = Namespace::for_module(dependent.namespace.local_snapshot(), export_filter, links, root.clone());
    Ok(Arc::new(Module {
        spec: dependent.spec.clone(),
        namespace: Arc::new(namespace),
        symbols: dependent.symbols.clone(),
        archive_create_time: dependent.archive_create_time,
        revision: dependent.revision,
        loaded_at: dependent.loaded_at,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap as Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tessera_compiler::ResourceCompiler;

    use super::*;
    use crate::listener::ModuleListener;

    fn plugin_table() -> PluginTable {
        let mut table = PluginTable::new();
        table.register(Arc::new(ResourceCompiler));
        table
    }

    fn loader() -> Loader {
        Loader::new(LoaderConfig {
            platform_symbols: Map::new(),
            app_package_filter: PackageFilter::all(),
            plugins: plugin_table(),
        })
    }

    fn archive(name: &str, deps: &[&str], entries: &[(&str, &str)], create_time: i64) -> Archive {
        let mut spec = ModuleSpec::minimal(ModuleId::new(name, "v1").unwrap());
        spec.compiler_plugin_ids.insert(tessera_compiler::resource::PLUGIN_ID.to_owned());
        spec.module_dependencies = deps.iter().map(|d| ModuleId::new(*d, "v1").unwrap()).collect();
        spec.import_package_filters = vec!["*".to_owned()];
        spec.export_package_filters = vec!["*".to_owned()];
        let map = entries
            .iter()
            .map(|(n, v)| ((*n).to_owned(), v.as_bytes().to_vec()))
            .collect();
        Archive::new(spec, map, create_time)
    }

    #[test]
    fn hello_world_archive_loads_and_resolves_its_own_symbol() {
        let loader = loader();
        let report = loader
            .update_archives(vec![archive("hello", &[], &[("Hello", "world")], 1)])
            .unwrap();
        assert!(report.is_fully_successful());
        assert_eq!(report.committed, vec![ModuleId::new("hello", "v1").unwrap()]);

        let module = loader.get_module(&ModuleId::new("hello", "v1").unwrap()).unwrap();
        assert_eq!(module.namespace().resolve("Hello").unwrap().bytes.as_ref(), b"world");
        assert_eq!(module.revision(), 1);
    }

    #[test]
    fn dependency_in_same_batch_links_in_one_update() {
        let loader = loader();
        let report = loader
            .update_archives(vec![
                archive("app", &["lib"], &[], 1),
                archive("lib", &[], &[("lib.Thing", "v1")], 1),
            ])
            .unwrap();
        assert!(report.is_fully_successful());

        let app = loader.get_module(&ModuleId::new("app", "v1").unwrap()).unwrap();
        assert_eq!(app.namespace().resolve("lib.Thing").unwrap().bytes.as_ref(), b"v1");
    }

    #[test]
    fn library_upgrade_relinks_dependent_without_recompiling_it() {
        let loader = loader();
        loader
            .update_archives(vec![
                archive("app", &["lib"], &[], 1),
                archive("lib", &[], &[("lib.Thing", "v1")], 1),
            ])
            .unwrap();
        let app_before = loader.get_module(&ModuleId::new("app", "v1").unwrap()).unwrap();

        let report = loader
            .update_archives(vec![archive("lib", &[], &[("lib.Thing", "v2")], 2)])
            .unwrap();
        assert!(report.is_fully_successful());

        let app_after = loader.get_module(&ModuleId::new("app", "v1").unwrap()).unwrap();
        assert_eq!(app_after.namespace().resolve("lib.Thing").unwrap().bytes.as_ref(), b"v2");
        // relink does not allocate a new revision number for the dependent
        assert_eq!(app_before.revision(), app_after.revision());

        let lib_after = loader.get_module(&ModuleId::new("lib", "v1").unwrap()).unwrap();
        assert_eq!(lib_after.revision(), 2);
    }

    #[test]
    fn bad_upgrade_preserves_dependents_previous_revision() {
        let loader = loader();
        loader
            .update_archives(vec![
                archive("app", &["lib"], &[], 1),
                archive("lib", &[], &[("lib.Thing", "v1")], 1),
            ])
            .unwrap();

        // A "lib" archive that depends on something never loaded fails to
        // resolve its own dependency, so it never joins the revision table
        // and the dependent is never asked to relink against it.
        let bad = archive("lib", &["missing"], &[], 2);
        let report = loader.update_archives(vec![bad]).unwrap();

        assert!(!report.failures.is_empty());
        let app = loader.get_module(&ModuleId::new("app", "v1").unwrap()).unwrap();
        assert_eq!(app.namespace().resolve("lib.Thing").unwrap().bytes.as_ref(), b"v1");
    }

    #[test]
    fn cycle_within_a_batch_is_rejected_and_nothing_is_committed() {
        let loader = loader();
        let err = loader
            .update_archives(vec![archive("a", &["b"], &[], 1), archive("b", &["a"], &[], 1)])
            .unwrap_err();
        assert!(matches!(err, LoaderError::CycleError { .. }));
        assert!(loader.get_module(&ModuleId::new("a", "v1").unwrap()).is_none());
    }

    #[test]
    fn stale_archive_is_skipped_without_touching_the_loaded_revision() {
        let loader = loader();
        loader.update_archives(vec![archive("hello", &[], &[("Hello", "v1")], 5)]).unwrap();

        let report = loader
            .update_archives(vec![archive("hello", &[], &[("Hello", "v0")], 5)])
            .unwrap();
        assert_eq!(report.skipped_stale, vec![ModuleId::new("hello", "v1").unwrap()]);

        let module = loader.get_module(&ModuleId::new("hello", "v1").unwrap()).unwrap();
        assert_eq!(module.namespace().resolve("Hello").unwrap().bytes.as_ref(), b"v1");
    }

    #[test]
    fn removing_a_module_cascades_to_dependents_that_fail_to_relink() {
        let loader = loader();
        loader
            .update_archives(vec![
                archive("app", &["lib"], &[], 1),
                archive("lib", &[], &[], 1),
            ])
            .unwrap();

        let report = loader.remove_module(&ModuleId::new("lib", "v1").unwrap());
        assert_eq!(
            report.removed,
            vec![ModuleId::new("lib", "v1").unwrap(), ModuleId::new("app", "v1").unwrap()]
        );
        assert!(loader.get_module(&ModuleId::new("app", "v1").unwrap()).is_none());
    }

    #[test]
    fn removing_a_module_does_not_disturb_unrelated_modules() {
        let loader = loader();
        loader
            .update_archives(vec![
                archive("app", &["a"], &[], 1),
                archive("a", &[], &[("a.Thing", "a")], 1),
                archive("b", &[], &[("b.Thing", "b")], 1),
            ])
            .unwrap();

        let report = loader.remove_module(&ModuleId::new("b", "v1").unwrap());
        assert_eq!(report.removed, vec![ModuleId::new("b", "v1").unwrap()]);
        assert!(loader.get_module(&ModuleId::new("app", "v1").unwrap()).is_some());
        assert!(loader.get_module(&ModuleId::new("a", "v1").unwrap()).is_some());
    }

    #[test]
    fn listeners_observe_commits_and_are_dropped_silently_once_gone() {
        struct CountingListener(AtomicUsize);
        impl ModuleListener for CountingListener {
            fn module_updated(&self, _old: Option<&Module>, _new: &Module) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn module_removed(&self, _old: &Module) {}
        }

        let loader = loader();
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        let weak: Weak<dyn ModuleListener> = Arc::downgrade(&listener);
        loader.add_listener(weak);

        loader.update_archives(vec![archive("hello", &[], &[], 1)]).unwrap();
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);

        drop(listener);
        // does not panic, and silently prunes the dead listener
        loader.update_archives(vec![archive("other", &[], &[], 1)]).unwrap();
    }
}
