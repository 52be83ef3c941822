//! The persistence gateway: a uniform interface over archive storage.

use std::collections::{BTreeMap, BTreeSet};

use tessera_archive::{Archive, ModuleId};

use crate::error::RepoError;
use crate::view::RepositoryView;

/// Durable storage for archives, with a default view and optional named
/// views / deploy-spec support.
///
/// Implementations that don't support named views or deploy specs should
/// rely on this trait's default method bodies, which raise
/// [`RepoError::UnsupportedView`] / [`RepoError::UnsupportedOperation`]
/// rather than silently no-op.
pub trait Repository: Send + Sync {
    /// Store `archive`. Idempotent: inserting an archive with the same
    /// content hash and an equal-or-older create time than what is already
    /// stored is a no-op; a strictly newer create time replaces it.
    ///
    /// # Errors
    /// Returns an error if the archive cannot be persisted.
    fn insert_archive(&self, archive: &Archive) -> Result<(), RepoError>;

    /// Remove the stored archive for `module_id`, if any.
    ///
    /// # Errors
    /// Returns an error if the archive cannot be removed.
    fn delete_archive(&self, module_id: &ModuleId) -> Result<(), RepoError>;

    /// Materialize the archives for `module_ids` to this repository's
    /// configured output directory, returning the ones that were found.
    ///
    /// # Errors
    /// Returns an error if a found archive cannot be read or materialized.
    fn get_script_archives(
        &self,
        module_ids: &BTreeSet<ModuleId>,
    ) -> Result<BTreeMap<ModuleId, Archive>, RepoError>;

    /// The default view: every archive currently stored.
    ///
    /// # Errors
    /// Returns an error if the view cannot be constructed.
    fn get_default_view(&self) -> Result<Box<dyn RepositoryView>, RepoError>;

    /// A named view, if this repository supports one.
    ///
    /// # Errors
    /// Returns [`RepoError::UnsupportedView`] unless overridden.
    fn get_view(&self, name: &str) -> Result<Box<dyn RepositoryView>, RepoError> {
        Err(RepoError::UnsupportedView {
            name: name.to_owned(),
        })
    }

    /// Store `archive` together with deploy-spec hints, if this repository
    /// supports them.
    ///
    /// # Errors
    /// Returns [`RepoError::UnsupportedOperation`] unless overridden.
    fn insert_archive_with_deploy_specs(
        &self,
        _archive: &Archive,
        _deploy_specs: &BTreeMap<String, String>,
    ) -> Result<(), RepoError> {
        Err(RepoError::UnsupportedOperation {
            operation: "insertArchive with deploy specs".to_owned(),
        })
    }

    /// Replace the deploy-spec hints for `module_id`, if this repository
    /// supports them.
    ///
    /// # Errors
    /// Returns [`RepoError::UnsupportedOperation`] unless overridden.
    fn put_deploy_specs(
        &self,
        _module_id: &ModuleId,
        _deploy_specs: &BTreeMap<String, String>,
    ) -> Result<(), RepoError> {
        Err(RepoError::UnsupportedOperation {
            operation: "putDeploySpecs".to_owned(),
        })
    }
}
