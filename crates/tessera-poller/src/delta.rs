//! Delta computation between two polls of a repository's update-time
//! snapshot: a pure function, kept separate from I/O so it can be tested
//! directly against hand-built snapshots.

use std::collections::{BTreeMap, BTreeSet};

use tessera_archive::ModuleId;

/// The set of module ids that changed between two snapshots of a
/// repository's `archive_update_times()`, classified the way the poller's
/// per-module state machine (Unknown → Present → Present' → Absent →
/// Present) observes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollDelta {
    /// Present in the current snapshot, absent from the last one.
    pub added: BTreeSet<ModuleId>,
    /// Present in both, with a strictly newer update time.
    pub modified: BTreeSet<ModuleId>,
    /// Present in the last snapshot, absent from the current one.
    pub removed: BTreeSet<ModuleId>,
}

impl PollDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// The ids whose archives need fetching: `added ∪ modified`.
    pub fn fetch_targets(&self) -> BTreeSet<ModuleId> {
        self.added.union(&self.modified).cloned().collect()
    }
}

/// Compute `current`'s delta against `last`. A module present in both with
/// an *equal* update time is a same-timestamp re-poll and reported as
/// neither added, modified, nor removed — a no-op, per the poller's state
/// machine.
pub fn compute_delta(current: &BTreeMap<ModuleId, i64>, last: &BTreeMap<ModuleId, i64>) -> PollDelta {
    let mut delta = PollDelta::default();

    for (module_id, update_time) in current {
        match last.get(module_id) {
            None => {
                delta.added.insert(module_id.clone());
            }
            Some(previous) if update_time > previous => {
                delta.modified.insert(module_id.clone());
            }
            Some(_) => {}
        }
    }

    for module_id in last.keys() {
        if !current.contains_key(module_id) {
            delta.removed.insert(module_id.clone());
        }
    }

    delta
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn id(name: &str) -> ModuleId {
        ModuleId::new(name, "v1").unwrap()
    }

    #[test]
    fn first_poll_reports_everything_as_added() {
        let current = BTreeMap::from([(id("a"), 1), (id("b"), 2)]);
        let delta = compute_delta(&current, &BTreeMap::new());
        assert_eq!(delta.added, BTreeSet::from([id("a"), id("b")]));
        assert!(delta.modified.is_empty());
        assert!(delta.removed.is_empty());
    }

    #[test]
    fn newer_update_time_is_reported_as_modified() {
        let last = BTreeMap::from([(id("a"), 1)]);
        let current = BTreeMap::from([(id("a"), 2)]);
        let delta = compute_delta(&current, &last);
        assert_eq!(delta.modified, BTreeSet::from([id("a")]));
        assert!(delta.added.is_empty());
    }

    #[test]
    fn same_timestamp_repoll_is_a_no_op() {
        let last = BTreeMap::from([(id("a"), 1)]);
        let current = BTreeMap::from([(id("a"), 1)]);
        let delta = compute_delta(&current, &last);
        assert!(delta.is_empty());
    }

    #[test]
    fn missing_from_current_is_reported_as_removed() {
        let last = BTreeMap::from([(id("a"), 1)]);
        let delta = compute_delta(&BTreeMap::new(), &last);
        assert_eq!(delta.removed, BTreeSet::from([id("a")]));
    }

    #[test]
    fn fetch_targets_is_added_union_modified() {
        let mut delta = PollDelta::default();
        delta.added.insert(id("a"));
        delta.modified.insert(id("b"));
        delta.removed.insert(id("c"));
        assert_eq!(delta.fetch_targets(), BTreeSet::from([id("a"), id("b")]));
    }

    #[test]
    fn re_add_after_removal_is_reported_as_added_again() {
        // Present -> Absent -> Present: the re-add tick sees nothing in
        // `last` (it was pruned on the Absent tick) and reports `added`,
        // matching the state machine's described transitions.
        let current = BTreeMap::from([(id("a"), 3)]);
        let delta = compute_delta(&current, &BTreeMap::new());
        assert_eq!(delta.added, BTreeSet::from([id("a")]));
    }
}
