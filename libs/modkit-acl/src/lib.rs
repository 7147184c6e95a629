#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `ModKit` ACL: object- and class-level access control over a relational store.
//!
//! Two halves share the permission store (`acl_classes`, `acl_security_identities`,
//! `acl_object_identities`, `acl_entries`):
//!
//! - the **write path**, [`AclManager`], loads or creates an object's ACL and upserts
//!   access control entries for a user or role;
//! - the **read path**, [`AclFilter`], tags a `SeaORM` query with the caller's identity
//!   tokens and the requested permission mask, and [`AclWalker`] renders it with joins
//!   against the store so the database returns only permitted rows.
//!
//! # Features
//! - `sqlite` (default), `pg`, `mysql`: `SeaORM` backends
//!
//! # Example
//! ```rust,ignore
//! use modkit_acl::{AclFilter, AclManager, DbAclProvider, FilterOptions, Permission};
//!
//! modkit_acl::create_schema(&db).await?;
//!
//! let mut manager = AclManager::with_config(DbAclProvider::new(db.clone()), &config);
//! manager.install_default_access(&post).await?;
//! manager
//!     .load_acl(&post)
//!     .await?
//!     .create_security_identity(&alice)?
//!     .set_object_permission(Permission::Owner.bits(), true)
//!     .await?;
//!
//! let filter = AclFilter::new(&config, subjects);
//! let visible: Vec<post::Model> = filter
//!     .apply(post::Entity::find(), FilterOptions::default())?
//!     .all(&db)
//!     .await?;
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod filter;
pub mod manager;
pub mod mask;
pub mod resolver;
pub mod store;

pub use config::{AclConfig, DefaultAccessConfig, MaskComparison};
pub use domain::{AceScope, Acl, DomainObject, Entry, ObjectIdentity, Principal, SecurityIdentity};
pub use error::AclError;
pub use filter::{
    AclEntity, AclFilter, AclHints, AclQuery, AclWalker, ExtraAclCriteria, FilterOptions,
    QueryComponent, QueryInput,
};
pub use manager::AclManager;
pub use mask::{MaskBuilder, Permission};
pub use resolver::IdentityResolver;
pub use store::{DbAclProvider, MutableAclProvider, create_schema};
