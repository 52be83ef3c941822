//! Per-module namespaces: isolated, filtered symbol resolution with a
//! parent chain and explicit dependency imports/exports.
#![forbid(unsafe_code)]

pub mod error;
pub mod filter;
pub mod namespace;

pub use error::NamespaceError;
pub use filter::PackageFilter;
pub use namespace::{Namespace, Resolved, SymbolBytes};
