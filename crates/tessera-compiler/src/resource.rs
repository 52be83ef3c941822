//! Reference compiler: publishes every archive entry as an opaque resource
//! symbol, doing no real compilation. The minimal legal plugin, used in
//! tests and the demo CLI to exercise the loader without depending on a
//! real source-language toolchain.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tessera_archive::Archive;
use tessera_namespace::Namespace;

use crate::compiler::Compiler;
use crate::error::CompileError;

pub const PLUGIN_ID: &str = "resource";

#[derive(Debug, Default)]
pub struct ResourceCompiler;

impl Compiler for ResourceCompiler {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn compile(
        &self,
        archive: &Archive,
        namespace: &mut Namespace,
        _workdir: &Path,
    ) -> Result<BTreeSet<String>, CompileError> {
        let mut published = BTreeSet::new();
        for name in archive.entry_names().map(str::to_owned).collect::<Vec<_>>() {
            let Some(bytes) = archive.entry_bytes(&name) else {
                continue; // unreachable: name came from entry_names()
            };
            namespace.register_symbol(name.clone(), Arc::from(bytes));
            published.insert(name);
        }
        Ok(published)
    }
}
