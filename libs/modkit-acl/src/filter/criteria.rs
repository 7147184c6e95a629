use sea_orm::sea_query::Value;

use super::query::AclQuery;
use super::walker::AclWalker;
use crate::error::AclError;

/// Scoped builder handed to an extra-criteria hook while a query is rewritten.
///
/// The hook sets one SQL fragment, which is ANDed into the WHERE clause. Values are
/// registered through [`Self::set_parameters`] and referenced in the fragment by the
/// returned names prefixed with a colon:
///
/// ```rust,ignore
/// FilterOptions::default().extra_criteria(|criteria| {
///     let alias = criteria.sql_table_alias("posts", "posts");
///     let names = criteria.set_parameters(["draft"]);
///     criteria.set_expression(format!(r#""{alias}"."status" <> :{}"#, names[0]));
///     Ok(())
/// })
/// ```
pub struct ExtraAclCriteria<'a> {
    walker: &'a mut AclWalker,
    query: &'a AclQuery,
    expression: Option<String>,
}

impl<'a> ExtraAclCriteria<'a> {
    pub(crate) fn new(walker: &'a mut AclWalker, query: &'a AclQuery) -> Self {
        Self {
            walker,
            query,
            expression: None,
        }
    }

    /// The query being rewritten.
    #[must_use]
    pub fn query(&self) -> &AclQuery {
        self.query
    }

    /// See [`AclWalker::sql_table_alias`].
    #[must_use]
    pub fn sql_table_alias(&self, table: &str, alias: &str) -> String {
        AclWalker::sql_table_alias(self.query, table, alias)
    }

    /// See [`AclWalker::table_name_from_alias`].
    ///
    /// # Errors
    /// Returns `AclError::TableMetadataUnavailable` for an unregistered alias.
    pub fn table_name(&self, alias: &str) -> Result<&str, AclError> {
        AclWalker::table_name_from_alias(self.query, alias)
    }

    /// Replace the fragment. It must not contain positional placeholders of its own.
    pub fn set_expression(&mut self, sql: impl Into<String>) -> &mut Self {
        self.expression = Some(sql.into());
        self
    }

    #[must_use]
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    /// Bind `values`, each under a freshly allocated `acl_N` name. Names are returned in
    /// input order.
    pub fn set_parameters<I, V>(&mut self, values: I) -> Vec<String>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .map(|value| self.walker.allocate_parameter(value))
            .collect()
    }

    pub(crate) fn into_expression(self) -> Option<String> {
        self.expression.filter(|sql| !sql.trim().is_empty())
    }
}
