use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, SqlErr, TransactionTrait,
};
use tracing::debug;

use super::entity::{class, entry, object_identity, security_identity};
use super::{AclMutation, MutableAclProvider};
use crate::domain::{AceScope, Acl, Entry, ObjectIdentity, SecurityIdentity};
use crate::error::AclError;

/// [`MutableAclProvider`] backed by a `SeaORM` connection.
#[derive(Clone, Debug)]
pub struct DbAclProvider {
    db: DatabaseConnection,
}

impl DbAclProvider {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl MutableAclProvider for DbAclProvider {
    async fn create_acl(&self, oid: &ObjectIdentity) -> Result<Acl, AclError> {
        let txn = self.db.begin().await?;

        let class_id = class_id_or_create(&txn, oid.kind()).await?;
        if find_object_row(&txn, class_id, oid, false).await?.is_some() {
            return Err(AclError::AclAlreadyExists(oid.to_string()));
        }

        insert_object_row(&txn, class_id, oid).await?;

        let acl = load_acl(&txn, oid)
            .await?
            .ok_or_else(|| AclError::AclNotFound(oid.to_string()))?;
        txn.commit().await?;

        debug!(object = %oid, "created ACL");
        Ok(acl)
    }

    async fn find_acl(&self, oid: &ObjectIdentity) -> Result<Acl, AclError> {
        load_acl(&self.db, oid)
            .await?
            .ok_or_else(|| AclError::AclNotFound(oid.to_string()))
    }

    async fn update_acl(&self, acl: &Acl) -> Result<(), AclError> {
        let oid = acl.object_identity();
        let txn = self.db.begin().await?;

        let rows = locate(&txn, oid, lock_rows(&txn))
            .await?
            .ok_or_else(|| AclError::AclNotFound(oid.to_string()))?;
        write_aces(&txn, rows, acl, &[AceScope::Class, AceScope::Object]).await?;
        txn.commit().await?;

        debug!(object = %oid, "updated ACL");
        Ok(())
    }

    async fn update_acl_with(
        &self,
        oid: &ObjectIdentity,
        mutate: AclMutation<'_>,
    ) -> Result<Acl, AclError> {
        let txn = self.db.begin().await?;

        let rows = locate(&txn, oid, lock_rows(&txn))
            .await?
            .ok_or_else(|| AclError::AclNotFound(oid.to_string()))?;
        let mut acl = read_acl(&txn, rows, oid).await?;
        let before = acl.clone();
        mutate(&mut acl)?;

        let changed: Vec<AceScope> = [AceScope::Class, AceScope::Object]
            .into_iter()
            .filter(|scope| acl.aces(*scope) != before.aces(*scope))
            .collect();
        write_aces(&txn, rows, &acl, &changed).await?;
        txn.commit().await?;

        debug!(
            object = %oid,
            class_aces = acl.aces(AceScope::Class).len(),
            object_aces = acl.aces(AceScope::Object).len(),
            "updated ACL in place"
        );
        Ok(acl)
    }

    async fn delete_acl(&self, oid: &ObjectIdentity) -> Result<(), AclError> {
        let txn = self.db.begin().await?;

        let Some(rows) = locate(&txn, oid, lock_rows(&txn)).await? else {
            debug!(object = %oid, "no ACL to delete");
            return Ok(());
        };

        entry::Entity::delete_many()
            .filter(entry::Column::ObjectIdentityId.eq(rows.object_id))
            .exec(&txn)
            .await?;
        object_identity::Entity::delete_by_id(rows.object_id)
            .exec(&txn)
            .await?;
        txn.commit().await?;

        debug!(object = %oid, "deleted ACL");
        Ok(())
    }
}

/// Store keys of one ACL.
#[derive(Clone, Copy, Debug)]
struct AclRows {
    class_id: i32,
    object_id: i32,
}

/// `SELECT ... FOR UPDATE` is only rendered where the backend supports row locks.
fn lock_rows<C: ConnectionTrait>(conn: &C) -> bool {
    conn.get_database_backend() != DbBackend::Sqlite
}

/// Class row lookup; `lock` takes the row lock that serializes writers of the class entries.
fn class_query(class_type: &str, lock: bool) -> Select<class::Entity> {
    let query = class::Entity::find().filter(class::Column::ClassType.eq(class_type));
    if lock { query.lock_exclusive() } else { query }
}

async fn find_class_id<C: ConnectionTrait>(conn: &C, class_type: &str) -> Result<Option<i32>, DbErr> {
    Ok(class_query(class_type, false).one(conn).await?.map(|m| m.id))
}

async fn class_id_or_create<C: ConnectionTrait>(conn: &C, class_type: &str) -> Result<i32, DbErr> {
    if let Some(id) = find_class_id(conn, class_type).await? {
        return Ok(id);
    }

    class::Entity::insert(class::ActiveModel {
        id: NotSet,
        class_type: Set(class_type.to_owned()),
    })
    .on_conflict(
        OnConflict::column(class::Column::ClassType)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;

    find_class_id(conn, class_type)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("acl class '{class_type}'")))
}

async fn find_sid_id<C: ConnectionTrait>(conn: &C, identifier: &str) -> Result<Option<i32>, DbErr> {
    Ok(security_identity::Entity::find()
        .filter(security_identity::Column::Identifier.eq(identifier))
        .one(conn)
        .await?
        .map(|m| m.id))
}

async fn sid_id_or_create<C: ConnectionTrait>(
    conn: &C,
    sid: &SecurityIdentity,
) -> Result<i32, DbErr> {
    let identifier = sid.identifier();
    if let Some(id) = find_sid_id(conn, &identifier).await? {
        return Ok(id);
    }

    security_identity::Entity::insert(security_identity::ActiveModel {
        id: NotSet,
        identifier: Set(identifier.clone()),
        username: Set(sid.is_user()),
    })
    .on_conflict(
        OnConflict::column(security_identity::Column::Identifier)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;

    find_sid_id(conn, &identifier)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("acl security identity '{identifier}'")))
}

/// Insert the object identity row; a unique violation means another writer created it first.
async fn insert_object_row<C: ConnectionTrait>(
    conn: &C,
    class_id: i32,
    oid: &ObjectIdentity,
) -> Result<(), AclError> {
    object_identity::Entity::insert(object_identity::ActiveModel {
        id: NotSet,
        class_id: Set(class_id),
        object_identifier: Set(oid.identifier().to_owned()),
    })
    .exec_without_returning(conn)
    .await
    .map(|_| ())
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AclError::AclAlreadyExists(oid.to_string()),
        _ => AclError::Db(err),
    })
}

async fn find_object_row<C: ConnectionTrait>(
    conn: &C,
    class_id: i32,
    oid: &ObjectIdentity,
    lock: bool,
) -> Result<Option<object_identity::Model>, DbErr> {
    let mut query = object_identity::Entity::find()
        .filter(object_identity::Column::ClassId.eq(class_id))
        .filter(object_identity::Column::ObjectIdentifier.eq(oid.identifier()));
    if lock {
        query = query.lock_exclusive();
    }
    query.one(conn).await
}

/// Resolve the store keys of `oid`. With `lock`, the class row is locked before the
/// object row so concurrent writers of one class queue up before reading its entries.
async fn locate<C: ConnectionTrait>(
    conn: &C,
    oid: &ObjectIdentity,
    lock: bool,
) -> Result<Option<AclRows>, DbErr> {
    let Some(class_id) = class_query(oid.kind(), lock).one(conn).await?.map(|m| m.id) else {
        return Ok(None);
    };
    Ok(find_object_row(conn, class_id, oid, lock)
        .await?
        .map(|row| AclRows {
            class_id,
            object_id: row.id,
        }))
}

async fn load_acl<C: ConnectionTrait>(
    conn: &C,
    oid: &ObjectIdentity,
) -> Result<Option<Acl>, AclError> {
    match locate(conn, oid, false).await? {
        Some(rows) => Ok(Some(read_acl(conn, rows, oid).await?)),
        None => Ok(None),
    }
}

async fn read_acl<C: ConnectionTrait>(
    conn: &C,
    rows: AclRows,
    oid: &ObjectIdentity,
) -> Result<Acl, AclError> {
    let class_rows = entry::Entity::find()
        .filter(entry::Column::ClassId.eq(rows.class_id))
        .filter(entry::Column::ObjectIdentityId.is_null())
        .order_by_asc(entry::Column::AceOrder)
        .all(conn)
        .await?;
    let object_rows = entry::Entity::find()
        .filter(entry::Column::ObjectIdentityId.eq(rows.object_id))
        .order_by_asc(entry::Column::AceOrder)
        .all(conn)
        .await?;

    let mut sid_ids: Vec<i32> = class_rows
        .iter()
        .chain(&object_rows)
        .map(|e| e.security_identity_id)
        .collect();
    sid_ids.sort_unstable();
    sid_ids.dedup();

    let mut sids = HashMap::with_capacity(sid_ids.len());
    if !sid_ids.is_empty() {
        for row in security_identity::Entity::find()
            .filter(security_identity::Column::Id.is_in(sid_ids))
            .all(conn)
            .await?
        {
            sids.insert(
                row.id,
                SecurityIdentity::from_stored(&row.identifier, row.username)?,
            );
        }
    }

    let class_aces = to_entries(class_rows, &sids)?;
    let object_aces = to_entries(object_rows, &sids)?;
    Ok(Acl::with_aces(oid.clone(), class_aces, object_aces))
}

fn to_entries(
    rows: Vec<entry::Model>,
    sids: &HashMap<i32, SecurityIdentity>,
) -> Result<Vec<Entry>, AclError> {
    rows.into_iter()
        .map(|row| {
            let sid = sids.get(&row.security_identity_id).cloned().ok_or_else(|| {
                AclError::Db(DbErr::RecordNotFound(format!(
                    "acl security identity #{}",
                    row.security_identity_id
                )))
            })?;
            let mask =
                u32::try_from(row.mask).map_err(|_| AclError::MaskOutOfRange(i64::from(row.mask)))?;
            Ok(Entry::new(sid, mask, row.granting))
        })
        .collect()
}

/// Replace the stored entries of `scopes` with those of `acl`, in order.
async fn write_aces<C: ConnectionTrait>(
    conn: &C,
    rows: AclRows,
    acl: &Acl,
    scopes: &[AceScope],
) -> Result<(), AclError> {
    let mut sid_cache: HashMap<String, i32> = HashMap::new();
    let mut models = Vec::new();
    for &scope in scopes {
        let (stored, object_identity_id) = match scope {
            AceScope::Class => (
                entry::Entity::delete_many()
                    .filter(entry::Column::ClassId.eq(rows.class_id))
                    .filter(entry::Column::ObjectIdentityId.is_null()),
                None,
            ),
            AceScope::Object => (
                entry::Entity::delete_many()
                    .filter(entry::Column::ObjectIdentityId.eq(rows.object_id)),
                Some(rows.object_id),
            ),
        };
        stored.exec(conn).await?;

        let aces = acl.aces(scope);
        for (index, ace) in aces.iter().enumerate() {
            let sid = ace.security_identity();
            let sid_id = match sid_cache.get(&sid.identifier()) {
                Some(id) => *id,
                None => {
                    let id = sid_id_or_create(conn, sid).await?;
                    sid_cache.insert(sid.identifier(), id);
                    id
                }
            };
            let ace_order = i32::try_from(index).map_err(|_| AclError::AceIndexOutOfBounds {
                index,
                len: aces.len(),
            })?;
            let mask = i32::try_from(ace.mask())
                .map_err(|_| AclError::MaskOutOfRange(i64::from(ace.mask())))?;

            models.push(entry::ActiveModel {
                id: NotSet,
                class_id: Set(rows.class_id),
                object_identity_id: Set(object_identity_id),
                security_identity_id: Set(sid_id),
                ace_order: Set(ace_order),
                mask: Set(mask),
                granting: Set(ace.is_granting()),
            });
        }
    }

    if !models.is_empty() {
        entry::Entity::insert_many(models)
            .exec_without_returning(conn)
            .await?;
    }
    Ok(())
}
