//! The persistence gateway: durable archive storage behind a uniform
//! [`Repository`] interface, plus a sharded remote repository for
//! datastore-backed deployments.

#![forbid(unsafe_code)]

pub mod error;
pub mod filesystem_repo;
pub mod jar_repo;
pub mod repository;
pub mod sharded;
pub mod view;

pub use error::RepoError;
pub use filesystem_repo::FilesystemRepository;
pub use jar_repo::JarFilesystemRepository;
pub use repository::Repository;
pub use sharded::{shard_for, RemoteRow, RemoteStore, ShardedRemoteRepository};
pub use view::{ArchiveSummary, RepositorySummary, RepositoryView};
