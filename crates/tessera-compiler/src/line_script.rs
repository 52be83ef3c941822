//! Reference compiler: treats each `*.tessera` entry as a newline-separated
//! list of symbol names. Exercises the workdir parameter and the
//! `CompileError` cause chain on malformed input, without depending on a
//! real source-language toolchain.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tessera_archive::Archive;
use tessera_namespace::Namespace;

use crate::compiler::Compiler;
use crate::error::CompileError;

pub const PLUGIN_ID: &str = "line-script";

const EXTENSION: &str = ".tessera";

#[derive(Debug, Default)]
pub struct LineScriptCompiler;

impl Compiler for LineScriptCompiler {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn compile(
        &self,
        archive: &Archive,
        namespace: &mut Namespace,
        workdir: &Path,
    ) -> Result<BTreeSet<String>, CompileError> {
        let mut batch = BTreeMap::new();

        for name in archive
            .entry_names()
            .filter(|n| n.ends_with(EXTENSION))
            .map(str::to_owned)
            .collect::<Vec<_>>()
        {
            let Some(bytes) = archive.entry_bytes(&name) else {
                continue; // unreachable: name came from entry_names()
            };
            let text = std::str::from_utf8(bytes).map_err(|source| CompileError {
                plugin_id: PLUGIN_ID.to_owned(),
                module_id: archive.module_id().clone(),
                cause: format!("{name} is not valid UTF-8: {source}"),
            })?;

            // Write the parsed intermediate to workdir, mirroring a real
            // compiler's use of scratch space for generated artifacts.
            let intermediate = workdir.join(format!("{name}.parsed"));
            if let Some(parent) = intermediate.parent() {
                std::fs::create_dir_all(parent).map_err(|source| CompileError {
                    plugin_id: PLUGIN_ID.to_owned(),
                    module_id: archive.module_id().clone(),
                    cause: format!("cannot create workdir {}: {source}", parent.display()),
                })?;
            }
            std::fs::write(&intermediate, text).map_err(|source| CompileError {
                plugin_id: PLUGIN_ID.to_owned(),
                module_id: archive.module_id().clone(),
                cause: format!("cannot write {}: {source}", intermediate.display()),
            })?;

            for line in text.lines() {
                let symbol = line.trim();
                if symbol.is_empty() {
                    continue;
                }
                if !is_valid_symbol_name(symbol) {
                    return Err(CompileError {
                        plugin_id: PLUGIN_ID.to_owned(),
                        module_id: archive.module_id().clone(),
                        cause: format!("invalid symbol name \"{symbol}\" in {name}"),
                    });
                }
                batch.insert(symbol.to_owned(), Arc::from(bytes.to_vec()));
            }
        }

        let published: BTreeSet<String> = batch.keys().cloned().collect();
        namespace.add_symbols(batch);
        Ok(published)
    }
}

fn is_valid_symbol_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}
