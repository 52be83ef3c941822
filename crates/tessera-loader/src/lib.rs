//! The module graph and loader: the component that turns a batch of
//! archives into linked, running modules and keeps the reachable graph
//! acyclic as archives are updated or removed.

#![forbid(unsafe_code)]

pub mod error;
pub mod listener;
pub mod loader;
pub mod module;
pub mod report;
pub mod topo;

pub use error::LoaderError;
pub use listener::ModuleListener;
pub use loader::{Loader, LoaderConfig};
pub use module::Module;
pub use report::{ArchiveFailure, RelinkFailure, RemoveReport, UpdateReport};
