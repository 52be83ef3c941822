//! Error type for the poller.

use tessera_repo::RepoError;

/// Errors produced while polling a registered repository.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}
