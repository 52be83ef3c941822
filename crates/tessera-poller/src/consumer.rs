//! The poller's output contract: what a completed tick hands to its
//! registered consumer.

use std::collections::BTreeSet;

use tessera_archive::{Archive, ModuleId};

/// Receives one repository's delta each tick. The loader is the typical
/// consumer: `archives` feeds `Loader::update_archives`, `removed` feeds one
/// `Loader::remove_module` call per id.
pub trait PollConsumer: Send + Sync {
    fn on_poll(&self, repository_id: &str, archives: Vec<Archive>, removed: BTreeSet<ModuleId>);
}
