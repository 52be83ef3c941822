//! Topological ordering of a batch of archives, with cycle detection
//! restricted to dependency edges that stay within the batch.

use std::collections::BTreeMap;

use tessera_archive::{Archive, ModuleId};

use crate::error::LoaderError;

/// Order `archives` so that any archive depending on another archive
/// present in the same batch comes after it. Dependencies pointing outside
/// the batch (already-loaded modules, or modules missing entirely) are not
/// part of this graph — they're resolved against the revision table at
/// compile time instead, and a cycle spanning an already-loaded module is
/// impossible by construction (the revision table is acyclic; see
/// `Loader`'s invariants).
///
/// Returns the indices of `archives` in build order.
///
/// # Errors
/// Returns [`LoaderError::CycleError`] if the batch contains a dependency
/// cycle among its own members.
pub fn topological_order(archives: &[Archive]) -> Result<Vec<usize>, LoaderError> {
    let index_by_id: BTreeMap<ModuleId, usize> = archives
        .iter()
        .enumerate()
        .map(|(i, a)| (a.module_id().clone(), i))
        .collect();

    // Three-color marking: 0 = white (unvisited), 1 = gray (on stack), 2 = black (done).
    let mut color = vec![0u8; archives.len()];
    let mut order = Vec::with_capacity(archives.len());

    for start in 0..archives.len() {
        if color[start] == 0 {
            let mut stack = Vec::new();
            visit(start, archives, &index_by_id, &mut color, &mut order, &mut stack)?;
        }
    }

    Ok(order)
}

fn visit(
    node: usize,
    archives: &[Archive],
    index_by_id: &BTreeMap<ModuleId, usize>,
    color: &mut [u8],
    order: &mut Vec<usize>,
    stack: &mut Vec<usize>,
) -> Result<(), LoaderError> {
    match color.get(node) {
        Some(2) => return Ok(()),
        Some(1) => {
            stack.push(node);
            let cycle_start = stack.iter().position(|&n| n == node).unwrap_or(0);
            let cycle = stack
                .get(cycle_start..)
                .unwrap_or(stack)
                .iter()
                .filter_map(|&i| archives.get(i))
                .map(|a| a.module_id().clone())
                .collect();
            return Err(LoaderError::CycleError { cycle });
        }
        _ => {}
    }

    if let Some(slot) = color.get_mut(node) {
        *slot = 1;
    }
    stack.push(node);

    let Some(archive) = archives.get(node) else {
        return Ok(()); // unreachable: node indices are bounded by archives.len()
    };
    for dep_id in &archive.spec().module_dependencies {
        if let Some(&dep_node) = index_by_id.get(dep_id) {
            visit(dep_node, archives, index_by_id, color, order, stack)?;
        }
    }

    if let Some(slot) = color.get_mut(node) {
        *slot = 2;
    }
    stack.pop();
    order.push(node);
    Ok(())
}
