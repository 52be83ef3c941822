//! One repository's polling schedule.

use std::sync::Arc;
use std::time::Duration;

use tessera_repo::Repository;

/// A repository registered with the poller, plus its own polling cadence.
pub struct Registration {
    pub repository_id: String,
    pub repository: Arc<dyn Repository>,
    pub interval: Duration,
    /// Whether `Poller::register` should block until this repository's
    /// first tick has completed before returning.
    pub wait_for_initial_poll: bool,
}
