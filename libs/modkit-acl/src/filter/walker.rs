use std::collections::HashMap;

use sea_orm::sea_query::{
    Alias, Condition, Expr, ExprTrait, Func, JoinType, Query, SelectStatement, SimpleExpr, Value,
};
use sea_orm::{DbBackend, Statement};
use tracing::debug;

use super::criteria::ExtraAclCriteria;
use super::query::{AclHints, AclQuery, QueryComponent};
use crate::config::MaskComparison;
use crate::error::AclError;
use crate::store::entity::{class, entry, object_identity, security_identity};

const OBJECT_ALIAS: &str = "o";
const CLASS_ALIAS: &str = "c";
const ENTRY_ALIAS: &str = "e";
const SID_ALIAS: &str = "s";
const MATCH_ENTRY_ALIAS: &str = "em";
const MATCH_SID_ALIAS: &str = "sm";

/// Prefix of the named placeholders handed out to extra criteria.
pub const PARAMETER_PREFIX: &str = "acl_";

/// Renders an [`AclQuery`], joining the permission store and adding the security
/// predicate when the query carries ACL hints.
///
/// The FROM clause is extended in a fixed order:
///
/// ```sql
/// INNER JOIN acl_object_identities o ON o.object_identifier = CAST(<alias>.<id> AS text)
/// INNER JOIN acl_classes c ON c.id = o.class_id [AND c.class_type IN (<classes>)]
/// LEFT JOIN acl_entries e ON e.mask >= :mask AND e.class_id = o.class_id
///     AND (e.object_identity_id = o.id OR e.object_identity_id IS NULL)
///     AND e.id IN (SELECT MIN(em.id) FROM acl_entries em
///                  INNER JOIN acl_security_identities sm ON sm.id = em.security_identity_id
///                  WHERE <same entry constraints on em> AND sm.identifier IN (:ids))
/// LEFT JOIN acl_security_identities s ON s.id = e.security_identity_id AND s.identifier IN (:ids)
/// ```
///
/// and the WHERE clause gains `s.identifier IN (:ids) AND e.mask >= :mask`, plus the
/// extra-criteria fragment if a hook is present.
///
/// Only the lowest matching entry joins, so a row matched by several entries is
/// returned once and the projection of the base query is left untouched.
#[derive(Debug)]
pub struct AclWalker {
    backend: DbBackend,
    next_parameter: usize,
    parameters: HashMap<String, Value>,
}

impl AclWalker {
    #[must_use]
    pub fn new(backend: DbBackend) -> Self {
        Self {
            backend,
            next_parameter: 0,
            parameters: HashMap::new(),
        }
    }

    #[must_use]
    pub fn backend(&self) -> DbBackend {
        self.backend
    }

    /// Register `value` under the next free parameter name and return that name
    /// (`acl_N`, without the leading colon). Numbering continues after the base
    /// query's own parameters.
    pub fn allocate_parameter(&mut self, value: impl Into<Value>) -> String {
        let name = format!("{PARAMETER_PREFIX}{}", self.next_parameter);
        self.next_parameter += 1;
        self.parameters.insert(name.clone(), value.into());
        name
    }

    /// Table behind `alias` in `query`.
    ///
    /// # Errors
    /// Returns `AclError::TableMetadataUnavailable` when no component is registered
    /// under `alias`.
    pub fn table_name_from_alias<'q>(query: &'q AclQuery, alias: &str) -> Result<&'q str, AclError> {
        query
            .component(alias)
            .map(QueryComponent::table)
            .ok_or_else(|| AclError::TableMetadataUnavailable(alias.to_owned()))
    }

    /// Name under which `table` is visible in the rendered SQL when referenced as
    /// `alias`: the alias if the query registers it, otherwise the bare table name.
    #[must_use]
    pub fn sql_table_alias(query: &AclQuery, table: &str, alias: &str) -> String {
        match query.component(alias) {
            Some(component) if component.table() == table => component.alias().to_owned(),
            _ => table.to_owned(),
        }
    }

    /// Render `query` for this walker's backend.
    ///
    /// # Errors
    /// Returns `AclError::TableMetadataUnavailable` when the secured alias is unknown,
    /// `AclError::UnboundParameter` when the extra-criteria fragment references an
    /// unallocated parameter, or the hook's own error.
    pub fn walk(mut self, query: &AclQuery) -> Result<Statement, AclError> {
        let Some(hints) = query.hints() else {
            return Ok(self.backend.build(query.statement()));
        };

        let alias = match hints.alias() {
            Some(alias) => alias,
            None => query
                .root_component()
                .map(QueryComponent::alias)
                .ok_or_else(|| AclError::TableMetadataUnavailable("<root>".to_owned()))?,
        };
        let component = query
            .component(alias)
            .ok_or_else(|| AclError::TableMetadataUnavailable(alias.to_owned()))?;

        let mut stmt = query.statement().clone();
        self.next_parameter = self
            .backend
            .build(&stmt)
            .values
            .map_or(0, |values| values.0.len());

        self.extend_from(&mut stmt, component, hints);
        Self::extend_where(&mut stmt, hints);

        if let Some(hook) = hints.extra_criteria() {
            let mut criteria = ExtraAclCriteria::new(&mut self, query);
            hook(&mut criteria)?;
            if let Some(fragment) = criteria.into_expression() {
                stmt.and_where(self.bind_fragment(&fragment)?);
            }
        }

        let rendered = self.backend.build(&stmt);
        debug!(
            alias,
            mask = hints.mask(),
            identifiers = hints.identifiers().len(),
            backend = ?self.backend,
            "rewrote query with ACL joins"
        );
        Ok(rendered)
    }

    fn extend_from(&self, stmt: &mut SelectStatement, component: &QueryComponent, hints: &AclHints) {
        let (o, c, e, s) = aliases();
        let text = Alias::new(match self.backend {
            DbBackend::MySql => "CHAR",
            DbBackend::Postgres | DbBackend::Sqlite => "text",
        });

        stmt.join_as(
            JoinType::InnerJoin,
            object_identity::Entity,
            o.clone(),
            Expr::col((o.clone(), object_identity::Column::ObjectIdentifier)).eq(
                Expr::col((
                    Alias::new(component.alias()),
                    Alias::new(component.identifier()),
                ))
                .cast_as(text),
            ),
        );

        let mut class_on = Condition::all().add(
            Expr::col((c.clone(), class::Column::Id))
                .equals((o.clone(), object_identity::Column::ClassId)),
        );
        if !component.classes().is_empty() {
            class_on = class_on.add(
                Expr::col((c.clone(), class::Column::ClassType))
                    .is_in(component.classes().iter().cloned()),
            );
        }
        stmt.join_as(JoinType::InnerJoin, class::Entity, c, class_on);

        stmt.join_as(
            JoinType::LeftJoin,
            entry::Entity,
            e.clone(),
            Condition::all()
                .add(mask_predicate(e.clone(), hints.mask(), hints.mask_comparison()))
                .add(
                    Expr::col((e.clone(), entry::Column::ClassId))
                        .equals((o.clone(), object_identity::Column::ClassId)),
                )
                .add(
                    Condition::any()
                        .add(
                            Expr::col((e.clone(), entry::Column::ObjectIdentityId))
                                .equals((o, object_identity::Column::Id)),
                        )
                        .add(Expr::col((e.clone(), entry::Column::ObjectIdentityId)).is_null()),
                )
                .add(Expr::col((e.clone(), entry::Column::Id)).in_subquery(matching_entry(hints))),
        );

        stmt.join_as(
            JoinType::LeftJoin,
            security_identity::Entity,
            s.clone(),
            Condition::all()
                .add(
                    Expr::col((s.clone(), security_identity::Column::Id))
                        .equals((e, entry::Column::SecurityIdentityId)),
                )
                .add(identifier_predicate(s, hints)),
        );
    }

    fn extend_where(stmt: &mut SelectStatement, hints: &AclHints) {
        let (_, _, e, s) = aliases();
        stmt.and_where(identifier_predicate(s, hints));
        stmt.and_where(mask_predicate(e, hints.mask(), hints.mask_comparison()));
    }

    /// Turn the `:acl_N` placeholders of an extra-criteria fragment into the backend's
    /// positional placeholders, binding the registered values in order of appearance.
    fn bind_fragment(&self, fragment: &str) -> Result<SimpleExpr, AclError> {
        let positional = match self.backend {
            DbBackend::Postgres => '$',
            DbBackend::MySql | DbBackend::Sqlite => '?',
        };
        if let Some(token) = stray_placeholder(fragment, positional) {
            return Err(AclError::UnboundParameter(token));
        }

        let marker = format!(":{PARAMETER_PREFIX}");
        let mut sql = String::with_capacity(fragment.len());
        let mut values: Vec<Value> = Vec::new();
        let mut rest = fragment;

        while let Some(pos) = rest.find(&marker) {
            let (head, tail) = rest.split_at(pos);
            sql.push_str(head);

            let after = &tail[marker.len()..];
            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            // `::acl_1` is a cast, not a placeholder
            if digits == 0 || head.ends_with(':') {
                sql.push_str(&marker);
                rest = after;
                continue;
            }

            let name = &tail[1..marker.len() + digits];
            let value = self
                .parameters
                .get(name)
                .cloned()
                .ok_or_else(|| AclError::UnboundParameter(name.to_owned()))?;
            values.push(value);
            match self.backend {
                DbBackend::Postgres => {
                    sql.push('$');
                    sql.push_str(&values.len().to_string());
                }
                DbBackend::MySql | DbBackend::Sqlite => sql.push('?'),
            }
            rest = &after[digits..];
        }
        sql.push_str(rest);

        Ok(Expr::cust_with_values(sql, values))
    }
}

fn aliases() -> (Alias, Alias, Alias, Alias) {
    (
        Alias::new(OBJECT_ALIAS),
        Alias::new(CLASS_ALIAS),
        Alias::new(ENTRY_ALIAS),
        Alias::new(SID_ALIAS),
    )
}

/// `SELECT MIN(em.id)` over the entries of the object joined as `o` that pass the mask
/// and identity constraints.
fn matching_entry(hints: &AclHints) -> SelectStatement {
    let (o, _, _, _) = aliases();
    let em = Alias::new(MATCH_ENTRY_ALIAS);
    let sm = Alias::new(MATCH_SID_ALIAS);

    Query::select()
        .expr(Func::min(Expr::col((em.clone(), entry::Column::Id))))
        .from_as(entry::Entity, em.clone())
        .join_as(
            JoinType::InnerJoin,
            security_identity::Entity,
            sm.clone(),
            Expr::col((sm.clone(), security_identity::Column::Id))
                .equals((em.clone(), entry::Column::SecurityIdentityId)),
        )
        .cond_where(
            Condition::all()
                .add(
                    Expr::col((em.clone(), entry::Column::ClassId))
                        .equals((o.clone(), object_identity::Column::ClassId)),
                )
                .add(
                    Condition::any()
                        .add(
                            Expr::col((em.clone(), entry::Column::ObjectIdentityId))
                                .equals((o, object_identity::Column::Id)),
                        )
                        .add(Expr::col((em.clone(), entry::Column::ObjectIdentityId)).is_null()),
                )
                .add(mask_predicate(em, hints.mask(), hints.mask_comparison()))
                .add(identifier_predicate(sm, hints)),
        )
        .to_owned()
}

/// First positional placeholder written directly into a fragment, outside quoted text.
/// Such placeholders have no value bound to them.
fn stray_placeholder(fragment: &str, positional: char) -> Option<String> {
    let mut quote: Option<char> = None;
    let mut chars = fragment.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
        } else if matches!(ch, '\'' | '"' | '`') {
            quote = Some(ch);
        } else if ch == positional {
            let mut end = i + ch.len_utf8();
            while let Some((j, d)) = chars.next_if(|(_, d)| d.is_ascii_digit()) {
                end = j + d.len_utf8();
            }
            return Some(fragment[i..end].to_owned());
        }
    }
    None
}

fn identifier_predicate(sid_alias: Alias, hints: &AclHints) -> SimpleExpr {
    Expr::col((sid_alias, security_identity::Column::Identifier))
        .is_in(hints.identifiers().iter().cloned())
}

fn mask_predicate(entry_alias: Alias, mask: u32, comparison: MaskComparison) -> SimpleExpr {
    let mask = i64::from(mask);
    let column = Expr::col((entry_alias, entry::Column::Mask));
    match comparison {
        MaskComparison::AtLeast => column.gte(mask),
        MaskComparison::AllBits => Expr::expr(column.bit_and(mask)).eq(mask),
    }
}
