use std::fmt;
use std::sync::Arc;

use sea_orm::sea_query::SelectStatement;
use sea_orm::{
    ConnectionTrait, DbBackend, FromQueryResult, IdenStatic, QueryTrait, Select,
    Statement,
};

use super::AclEntity;
use super::criteria::ExtraAclCriteria;
use super::walker::AclWalker;
use crate::config::MaskComparison;
use crate::error::AclError;

/// Caller-supplied hook that adds a predicate to the rewritten query.
pub type ExtraCriteriaFn =
    Arc<dyn Fn(&mut ExtraAclCriteria<'_>) -> Result<(), AclError> + Send + Sync>;

/// Table metadata for one alias of a query: the table behind it, the column holding
/// the object identifier, and the ACL class names its rows belong to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryComponent {
    alias: String,
    table: String,
    identifier: String,
    classes: Vec<String>,
}

impl QueryComponent {
    #[must_use]
    pub fn new(
        alias: impl Into<String>,
        table: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            table: table.into(),
            identifier: identifier.into(),
            classes: Vec::new(),
        }
    }

    /// Restrict the class join to these ACL class names.
    #[must_use]
    pub fn with_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classes.extend(classes.into_iter().map(Into::into));
        self
    }

    /// Component of the root table of an entity query, aliased by its table name.
    #[must_use]
    pub fn for_entity<E: AclEntity>() -> Self {
        let table = E::default().table_name().to_owned();
        Self::new(table.clone(), table, E::identifier_col().as_str())
            .with_classes(std::iter::once(E::acl_class()).chain(E::acl_subclasses().iter().copied()))
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// What the rewriter needs to secure a query. Never persisted.
#[derive(Clone)]
pub struct AclHints {
    identifiers: Vec<String>,
    mask: u32,
    alias: Option<String>,
    extra_criteria: Option<ExtraCriteriaFn>,
    mask_comparison: MaskComparison,
}

impl AclHints {
    #[must_use]
    pub fn new(identifiers: Vec<String>, mask: u32) -> Self {
        Self {
            identifiers,
            mask,
            alias: None,
            extra_criteria: None,
            mask_comparison: MaskComparison::default(),
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    #[must_use]
    pub fn with_extra_criteria(mut self, extra: Option<ExtraCriteriaFn>) -> Self {
        self.extra_criteria = extra;
        self
    }

    #[must_use]
    pub fn with_mask_comparison(mut self, comparison: MaskComparison) -> Self {
        self.mask_comparison = comparison;
        self
    }

    #[must_use]
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    #[must_use]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    #[must_use]
    pub fn extra_criteria(&self) -> Option<&ExtraCriteriaFn> {
        self.extra_criteria.as_ref()
    }

    #[must_use]
    pub fn mask_comparison(&self) -> MaskComparison {
        self.mask_comparison
    }
}

impl fmt::Debug for AclHints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AclHints")
            .field("identifiers", &self.identifiers)
            .field("mask", &self.mask)
            .field("alias", &self.alias)
            .field("extra_criteria", &self.extra_criteria.is_some())
            .field("mask_comparison", &self.mask_comparison)
            .finish()
    }
}

/// A finalized read query plus its component metadata and, once filtered, its ACL hints.
///
/// Without hints the query renders unchanged.
#[derive(Clone, Debug)]
pub struct AclQuery {
    statement: SelectStatement,
    components: Vec<QueryComponent>,
    hints: Option<AclHints>,
}

impl AclQuery {
    /// Wrap a raw statement. Register its components before filtering it.
    #[must_use]
    pub fn new(statement: SelectStatement) -> Self {
        Self {
            statement,
            components: Vec::new(),
            hints: None,
        }
    }

    /// Finalize an entity query; its table becomes the root component.
    #[must_use]
    pub fn from_select<E: AclEntity>(select: Select<E>) -> Self {
        Self::new(select.into_query()).with_component(QueryComponent::for_entity::<E>())
    }

    /// Register metadata for an alias. The first component registered is the root.
    #[must_use]
    pub fn with_component(mut self, component: QueryComponent) -> Self {
        self.components.retain(|c| c.alias != component.alias);
        self.components.push(component);
        self
    }

    #[must_use]
    pub fn with_hints(mut self, hints: AclHints) -> Self {
        self.hints = Some(hints);
        self
    }

    #[must_use]
    pub fn statement(&self) -> &SelectStatement {
        &self.statement
    }

    #[must_use]
    pub fn component(&self, alias: &str) -> Option<&QueryComponent> {
        self.components.iter().find(|c| c.alias == alias)
    }

    #[must_use]
    pub fn root_component(&self) -> Option<&QueryComponent> {
        self.components.first()
    }

    #[must_use]
    pub fn hints(&self) -> Option<&AclHints> {
        self.hints.as_ref()
    }

    /// Render the final SQL for `backend`.
    ///
    /// # Errors
    /// Returns `AclError::TableMetadataUnavailable` when the secured alias has no
    /// registered component, or the error of the extra-criteria hook.
    pub fn build(&self, backend: DbBackend) -> Result<Statement, AclError> {
        AclWalker::new(backend).walk(self)
    }

    /// Run the query and map every row into `M`.
    ///
    /// # Errors
    /// Returns the rendering error of [`Self::build`] or `AclError::Db`.
    pub async fn all<M, C>(&self, conn: &C) -> Result<Vec<M>, AclError>
    where
        M: FromQueryResult,
        C: ConnectionTrait,
    {
        let stmt = self.build(conn.get_database_backend())?;
        Ok(M::find_by_statement(stmt).all(conn).await?)
    }

    /// Run the query and map the first row into `M`.
    ///
    /// # Errors
    /// Returns the rendering error of [`Self::build`] or `AclError::Db`.
    pub async fn one<M, C>(&self, conn: &C) -> Result<Option<M>, AclError>
    where
        M: FromQueryResult,
        C: ConnectionTrait,
    {
        let stmt = self.build(conn.get_database_backend())?;
        Ok(M::find_by_statement(stmt).one(conn).await?)
    }
}

impl<E: AclEntity> From<Select<E>> for AclQuery {
    fn from(select: Select<E>) -> Self {
        Self::from_select(select)
    }
}

