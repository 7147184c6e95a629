//! The permission store: entities, schema and the ACL provider seam.

pub mod entity;
mod migrations;
mod provider;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;

use crate::domain::{Acl, ObjectIdentity};
use crate::error::AclError;

pub use migrations::Migrator;
pub use provider::DbAclProvider;

/// A mutation applied to a freshly loaded ACL inside the store transaction.
pub type AclMutation<'a> = Box<dyn FnOnce(&mut Acl) -> Result<(), AclError> + Send + 'a>;

/// Read and write access to persisted ACLs.
#[async_trait]
pub trait MutableAclProvider: Send + Sync {
    /// Create an empty ACL for `oid`. The returned ACL already carries the class entries
    /// of `oid`'s type.
    ///
    /// # Errors
    /// Returns `AclError::AclAlreadyExists` when `oid` already has an ACL, including when
    /// a concurrent writer created it first.
    async fn create_acl(&self, oid: &ObjectIdentity) -> Result<Acl, AclError>;

    /// # Errors
    /// Returns `AclError::AclNotFound` when `oid` has no ACL.
    async fn find_acl(&self, oid: &ObjectIdentity) -> Result<Acl, AclError>;

    /// Persist both entry collections of `acl`, replacing what is stored.
    ///
    /// # Errors
    /// Returns `AclError::AclNotFound` when the ACL was never created.
    async fn update_acl(&self, acl: &Acl) -> Result<(), AclError>;

    /// Reload the ACL of `oid`, apply `mutate` and persist the result in one transaction.
    /// Nothing is written when `mutate` fails.
    ///
    /// # Errors
    /// Returns `AclError::AclNotFound` when `oid` has no ACL, or the error of `mutate`.
    async fn update_acl_with(
        &self,
        oid: &ObjectIdentity,
        mutate: AclMutation<'_>,
    ) -> Result<Acl, AclError>;

    /// Remove the ACL of `oid` and its object entries. Class entries are kept.
    ///
    /// # Errors
    /// Returns `AclError::Db` when the store fails.
    async fn delete_acl(&self, oid: &ObjectIdentity) -> Result<(), AclError>;
}

/// Create the ACL tables if they do not exist yet.
///
/// # Errors
/// Returns `AclError::Db` when a migration fails.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), AclError> {
    tracing::debug!("applying ACL store migrations");
    Migrator::up(db, None).await?;
    Ok(())
}
