//! Read-path filtering: tag a query with the caller's identities and requested mask,
//! then let [`AclWalker`] rewrite it against the permission store.

mod criteria;
mod query;
mod walker;

use std::fmt;
use std::sync::Arc;

use modkit_security::SubjectProviderRef;
use sea_orm::sea_query::{DeleteStatement, InsertStatement, SelectStatement, UpdateStatement};
use sea_orm::{EntityTrait, Select};
use tracing::debug;

use crate::config::{AclConfig, MaskComparison};
use crate::domain::Principal;
use crate::error::AclError;
use crate::mask::MaskBuilder;
use crate::resolver::IdentityResolver;

pub use criteria::ExtraAclCriteria;
pub use query::{AclHints, AclQuery, ExtraCriteriaFn, QueryComponent};
pub use walker::{AclWalker, PARAMETER_PREFIX};

/// An entity whose rows are protected by ACLs.
///
/// ```rust,ignore
/// impl AclEntity for post::Entity {
///     fn acl_class() -> &'static str {
///         "app::Post"
///     }
///     fn identifier_col() -> Self::Column {
///         post::Column::Id
///     }
/// }
/// ```
pub trait AclEntity: EntityTrait {
    /// ACL class name of the entity's rows.
    fn acl_class() -> &'static str;

    /// Class names of specialized rows stored in the same table.
    fn acl_subclasses() -> &'static [&'static str] {
        &[]
    }

    /// Column compared with `acl_object_identities.object_identifier`.
    fn identifier_col() -> Self::Column;
}

/// Anything [`AclFilter::apply`] accepts. Write statements convert too, so that they
/// are rejected at runtime with `UnsupportedQueryType`.
#[derive(Debug)]
pub enum QueryInput {
    Query(Box<AclQuery>),
    Unsupported(&'static str),
}

impl<E: AclEntity> From<Select<E>> for QueryInput {
    fn from(select: Select<E>) -> Self {
        Self::Query(Box::new(AclQuery::from_select(select)))
    }
}

impl From<SelectStatement> for QueryInput {
    fn from(statement: SelectStatement) -> Self {
        Self::Query(Box::new(AclQuery::new(statement)))
    }
}

impl From<AclQuery> for QueryInput {
    fn from(query: AclQuery) -> Self {
        Self::Query(Box::new(query))
    }
}

impl From<InsertStatement> for QueryInput {
    fn from(_: InsertStatement) -> Self {
        Self::Unsupported("INSERT")
    }
}

impl From<UpdateStatement> for QueryInput {
    fn from(_: UpdateStatement) -> Self {
        Self::Unsupported("UPDATE")
    }
}

impl From<DeleteStatement> for QueryInput {
    fn from(_: DeleteStatement) -> Self {
        Self::Unsupported("DELETE")
    }
}

/// Per-call options of [`AclFilter::apply`].
#[derive(Clone)]
pub struct FilterOptions {
    permissions: Vec<String>,
    identity: Option<Principal>,
    alias: Option<String>,
    extra_criteria: Option<ExtraCriteriaFn>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            permissions: vec!["VIEW".to_owned()],
            identity: None,
            alias: None,
            extra_criteria: None,
        }
    }
}

impl FilterOptions {
    /// Required permission names, combined into one mask.
    #[must_use]
    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Filter for this subject, role or context instead of the current subject.
    #[must_use]
    pub fn identity(mut self, identity: impl Into<Principal>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Secure this alias instead of the query's root component.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn extra_criteria<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ExtraAclCriteria<'_>) -> Result<(), AclError> + Send + Sync + 'static,
    {
        self.extra_criteria = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for FilterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterOptions")
            .field("permissions", &self.permissions)
            .field("identity", &self.identity)
            .field("alias", &self.alias)
            .field("extra_criteria", &self.extra_criteria.is_some())
            .finish()
    }
}

/// Entry point of the read path.
#[derive(Clone)]
pub struct AclFilter {
    resolver: IdentityResolver,
    subjects: SubjectProviderRef,
    mask_comparison: MaskComparison,
}

impl AclFilter {
    /// `subjects` supplies the current subject when a call names no identity.
    #[must_use]
    pub fn new(config: &AclConfig, subjects: SubjectProviderRef) -> Self {
        Self {
            resolver: IdentityResolver::new(config.role_hierarchy.clone()),
            subjects,
            mask_comparison: config.mask_comparison,
        }
    }

    #[must_use]
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Tag `query` with the resolved identities and the combined permission mask.
    /// Nothing is executed; render or run the returned query.
    ///
    /// # Errors
    /// Returns `AclError::UnsupportedQueryType` for write statements,
    /// `AclError::UnknownPermissionName` for an unknown permission,
    /// `AclError::NoAuthenticatedSubject` when no identity is given and nobody is
    /// authenticated, or `AclError::InvalidIdentity` for a blank identity.
    pub fn apply(
        &self,
        query: impl Into<QueryInput>,
        options: FilterOptions,
    ) -> Result<AclQuery, AclError> {
        let query = match query.into() {
            QueryInput::Query(query) => *query,
            QueryInput::Unsupported(kind) => return Err(AclError::UnsupportedQueryType(kind)),
        };

        let mask = MaskBuilder::from_names(&options.permissions)?;

        let current = self.subjects.current_subject();
        let identifiers = self
            .resolver
            .resolve(options.identity.as_ref(), current.as_ref())?;

        debug!(
            mask,
            identifiers = identifiers.len(),
            alias = options.alias.as_deref(),
            extra_criteria = options.extra_criteria.is_some(),
            "applying ACL filter"
        );

        let hints = AclHints::new(identifiers, mask)
            .with_alias(options.alias)
            .with_extra_criteria(options.extra_criteria)
            .with_mask_comparison(self.mask_comparison);
        Ok(query.with_hints(hints))
    }
}

impl fmt::Debug for AclFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AclFilter")
            .field("resolver", &self.resolver)
            .field("mask_comparison", &self.mask_comparison)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use modkit_security::constants::IS_AUTHENTICATED_ANONYMOUSLY;
    use modkit_security::{RoleHierarchy, SecurityContext, Subject};
    use sea_orm::sea_query::{Alias, Query};
    use tracing_test::traced_test;

    use super::*;
    use crate::mask::Permission;

    fn filter(ctx: SecurityContext) -> AclFilter {
        let config = AclConfig {
            role_hierarchy: RoleHierarchy::builder()
                .role("ROLE_ADMIN", ["ROLE_USER"])
                .build(),
            ..AclConfig::default()
        };
        AclFilter::new(&config, Arc::new(ctx))
    }

    fn select() -> SelectStatement {
        Query::select().column(Alias::new("id")).from(Alias::new("posts")).to_owned()
    }

    #[test]
    fn test_defaults_to_view_and_current_subject() {
        let alice = Subject::new("app::User", "alice").with_role("ROLE_ADMIN");
        let query = filter(SecurityContext::authenticated(alice))
            .apply(select(), FilterOptions::default())
            .unwrap();

        let hints = query.hints().unwrap();
        assert_eq!(hints.mask(), Permission::View.bits());
        assert_eq!(hints.identifiers(), ["app::User-alice", "ROLE_ADMIN", "ROLE_USER"]);
        assert!(hints.alias().is_none());
        assert!(hints.extra_criteria().is_none());
    }

    #[test]
    fn test_explicit_role_and_permissions() {
        let query = filter(SecurityContext::anonymous())
            .apply(
                select(),
                FilterOptions::default()
                    .permissions(["view", "edit"])
                    .identity(IS_AUTHENTICATED_ANONYMOUSLY)
                    .alias("p"),
            )
            .unwrap();

        let hints = query.hints().unwrap();
        assert_eq!(hints.mask(), 5);
        assert_eq!(hints.identifiers(), [IS_AUTHENTICATED_ANONYMOUSLY]);
        assert_eq!(hints.alias(), Some("p"));
    }

    #[test]
    fn test_write_statements_are_rejected_first() {
        let err = filter(SecurityContext::anonymous())
            .apply(
                Query::delete().from_table(Alias::new("posts")).to_owned(),
                FilterOptions::default().permissions(["NOPE"]),
            )
            .unwrap_err();
        assert!(matches!(err, AclError::UnsupportedQueryType("DELETE")));
    }

    #[test]
    fn test_unknown_permission_before_identity_resolution() {
        let err = filter(SecurityContext::anonymous())
            .apply(select(), FilterOptions::default().permissions(["PUBLISH"]))
            .unwrap_err();
        assert!(matches!(err, AclError::UnknownPermissionName(ref n) if n == "PUBLISH"));
    }

    #[test]
    fn test_nobody_authenticated() {
        let err = filter(SecurityContext::anonymous())
            .apply(select(), FilterOptions::default())
            .unwrap_err();
        assert!(matches!(err, AclError::NoAuthenticatedSubject));
    }

    #[test]
    fn test_anonymous_context_as_identity() {
        let query = filter(SecurityContext::anonymous())
            .apply(
                select(),
                FilterOptions::default().identity(SecurityContext::anonymous()),
            )
            .unwrap();
        assert_eq!(
            query.hints().unwrap().identifiers(),
            [IS_AUTHENTICATED_ANONYMOUSLY]
        );
    }

    #[test]
    #[traced_test]
    fn test_logs_applied_filter() {
        let bob = Subject::new("app::User", "bob");
        filter(SecurityContext::authenticated(bob))
            .apply(select(), FilterOptions::default().permissions(["EDIT"]))
            .unwrap();

        assert!(logs_contain("applying ACL filter"));
        assert!(logs_contain("mask=4"));
    }
}
