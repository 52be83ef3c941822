//! The loader's table of installed compiler plugins.

use std::sync::Arc;

use tessera_archive::Archive;

use crate::compiler::Compiler;

/// A loader's installed set of compiler plugins, tried in registration
/// order. [`PluginTable::select`] returns the first plugin whose
/// `should_compile` returns `true`; no match means the archive has no
/// compiler willing to handle it.
#[derive(Clone, Default)]
pub struct PluginTable {
    plugins: Vec<Arc<dyn Compiler>>,
}

impl PluginTable {
    pub fn new() -> Self {
        PluginTable {
            plugins: Vec::new(),
        }
    }

    pub fn register(&mut self, plugin: Arc<dyn Compiler>) {
        self.plugins.push(plugin);
    }

    /// Look up a plugin by its id, regardless of registration order.
    pub fn get(&self, plugin_id: &str) -> Option<Arc<dyn Compiler>> {
        self.plugins
            .iter()
            .find(|plugin| plugin.plugin_id() == plugin_id)
            .cloned()
    }

    /// The first registered plugin willing to compile `archive`.
    pub fn select(&self, archive: &Archive) -> Option<Arc<dyn Compiler>> {
        self.plugins
            .iter()
            .find(|plugin| plugin.should_compile(archive))
            .cloned()
    }
}
