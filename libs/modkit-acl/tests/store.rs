#![allow(clippy::unwrap_used, clippy::expect_used)]
#![cfg(feature = "sqlite")]

mod common;

use std::collections::HashMap;

use common::{POST_CLASS, insert_posts, setup};
use modkit_acl::store::entity::{entry, object_identity};
use modkit_acl::{
    AceScope, Acl, AclError, AclManager, DbAclProvider, MutableAclProvider, ObjectIdentity,
    Permission, Principal, SecurityIdentity,
};
use modkit_security::Subject;
use modkit_security::constants::{
    IS_AUTHENTICATED_ANONYMOUSLY, ROLE_ADMIN, ROLE_SUPER_ADMIN, ROLE_USER,
};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};

fn class_masks(acl: &Acl) -> HashMap<String, u32> {
    acl.aces(AceScope::Class)
        .iter()
        .map(|e| (e.security_identity().identifier(), e.mask()))
        .collect()
}

async fn class_entry_ids(db: &DatabaseConnection) -> Vec<i32> {
    let mut ids: Vec<i32> = entry::Entity::find()
        .all(db)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.object_identity_id.is_none())
        .map(|e| e.id)
        .collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn load_acl_creates_then_reuses_the_record() {
    let db = setup().await;
    let posts = insert_posts(&db, &[(1, "hello", "published")]).await;
    let mut manager = AclManager::new(DbAclProvider::new(db.clone()));

    manager.load_acl(&posts[0]).await.unwrap();
    manager.load_acl(&posts[0]).await.unwrap();

    let acl = manager.acl().unwrap();
    assert_eq!(acl.object_identity(), &ObjectIdentity::new(POST_CLASS, "1").unwrap());
    assert!(acl.aces(AceScope::Object).is_empty());
    assert_eq!(object_identity::Entity::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_loads_of_a_new_object_both_succeed() {
    let db = setup().await;
    let posts = insert_posts(&db, &[(7, "race", "published")]).await;
    let mut first = AclManager::new(DbAclProvider::new(db.clone()));
    let mut second = AclManager::new(DbAclProvider::new(db.clone()));

    let (a, b) = tokio::join!(first.load_acl(&posts[0]), second.load_acl(&posts[0]));
    a.unwrap();
    b.unwrap();

    assert_eq!(
        first.acl().unwrap().object_identity(),
        second.acl().unwrap().object_identity()
    );
    assert_eq!(object_identity::Entity::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn create_twice_reports_already_exists() {
    let db = setup().await;
    let provider = DbAclProvider::new(db);
    let oid = ObjectIdentity::new(POST_CLASS, "3").unwrap();

    provider.create_acl(&oid).await.unwrap();
    let err = provider.create_acl(&oid).await.unwrap_err();
    assert!(matches!(err, AclError::AclAlreadyExists(_)));
}

#[tokio::test]
async fn missing_acls_are_not_found() {
    let db = setup().await;
    let provider = DbAclProvider::new(db);
    let oid = ObjectIdentity::new(POST_CLASS, "404").unwrap();

    assert!(matches!(
        provider.find_acl(&oid).await.unwrap_err(),
        AclError::AclNotFound(_)
    ));
    let err = provider
        .update_acl_with(&oid, Box::new(|_: &mut Acl| Ok(())))
        .await
        .unwrap_err();
    assert!(matches!(err, AclError::AclNotFound(_)));
}

#[tokio::test]
async fn default_access_is_installed_once() {
    let db = setup().await;
    let posts = insert_posts(&db, &[(1, "a", "published"), (2, "b", "published")]).await;
    let mut manager = AclManager::new(DbAclProvider::new(db.clone()));

    assert!(manager.install_default_access(&posts[0]).await.unwrap());
    assert!(manager.install_default_access(&posts[1]).await.unwrap());
    assert!(manager.install_default_access(&posts[0]).await.unwrap());

    let acl = manager
        .provider()
        .find_acl(&ObjectIdentity::new(POST_CLASS, "2").unwrap())
        .await
        .unwrap();
    let masks = class_masks(&acl);
    assert_eq!(masks.len(), 4);
    assert_eq!(masks[ROLE_SUPER_ADMIN], Permission::Iddqd.bits());
    assert_eq!(masks[ROLE_ADMIN], Permission::Master.bits());
    assert_eq!(masks[IS_AUTHENTICATED_ANONYMOUSLY], Permission::View.bits());
    assert_eq!(
        masks[ROLE_USER],
        Permission::Create.bits() | Permission::View.bits()
    );
    assert_eq!(entry::Entity::find().count(&db).await.unwrap(), 4);
}

#[tokio::test]
async fn concurrent_default_access_on_two_objects_shares_one_class_set() {
    let db = setup().await;
    let posts = insert_posts(&db, &[(1, "a", "published"), (2, "b", "published")]).await;
    let mut first = AclManager::new(DbAclProvider::new(db.clone()));
    let mut second = AclManager::new(DbAclProvider::new(db.clone()));

    let (a, b) = tokio::join!(
        first.install_default_access(&posts[0]),
        second.install_default_access(&posts[1])
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(entry::Entity::find().count(&db).await.unwrap(), 4);
}

#[tokio::test]
async fn object_permission_leaves_class_entries_in_place() {
    let db = setup().await;
    let posts = insert_posts(&db, &[(1, "a", "published")]).await;
    let mut manager = AclManager::new(DbAclProvider::new(db.clone()));
    manager.install_default_access(&posts[0]).await.unwrap();
    let before = class_entry_ids(&db).await;

    manager
        .load_acl(&posts[0])
        .await
        .unwrap()
        .create_security_identity(&Subject::new("app::User", "alice"))
        .unwrap()
        .set_object_permission(Permission::Edit.bits(), true)
        .await
        .unwrap();

    assert_eq!(class_entry_ids(&db).await, before);
}

#[tokio::test]
async fn repeated_set_keeps_one_entry_with_the_last_mask() {
    let db = setup().await;
    let posts = insert_posts(&db, &[(1, "a", "published")]).await;
    let alice = Subject::new("app::User", "alice");
    let mut manager = AclManager::new(DbAclProvider::new(db.clone()));

    manager
        .load_acl(&posts[0])
        .await
        .unwrap()
        .create_security_identity(&alice)
        .unwrap();
    for mask in [
        Permission::View.bits(),
        Permission::Edit.bits(),
        Permission::Owner.bits(),
    ] {
        manager.set_object_permission(mask, true).await.unwrap();
    }
    manager
        .set_object_permission(Permission::Delete.bits(), false)
        .await
        .unwrap();

    let stored = manager
        .provider()
        .find_acl(&ObjectIdentity::new(POST_CLASS, "1").unwrap())
        .await
        .unwrap();
    let entries: Vec<(String, u32, bool)> = stored
        .aces(AceScope::Object)
        .iter()
        .map(|e| (e.security_identity().identifier(), e.mask(), e.is_granting()))
        .collect();
    assert_eq!(
        entries,
        [
            ("app::User-alice".to_owned(), Permission::Delete.bits(), false),
            ("app::User-alice".to_owned(), Permission::Owner.bits(), true),
        ]
    );
    assert!(stored.aces(AceScope::Class).is_empty());

    let alice_sid = SecurityIdentity::try_from(&Principal::from(&alice)).unwrap();
    assert_eq!(
        stored.is_granted(&[Permission::Owner.bits()], &[alice_sid]),
        Some(true)
    );
}

#[tokio::test]
async fn unset_removes_only_the_matching_flag() {
    let db = setup().await;
    let posts = insert_posts(&db, &[(1, "a", "published")]).await;
    let mut manager = AclManager::new(DbAclProvider::new(db));

    manager
        .load_acl(&posts[0])
        .await
        .unwrap()
        .create_security_identity(ROLE_USER)
        .unwrap()
        .set_class_permission(Permission::Edit.bits(), true)
        .await
        .unwrap()
        .set_class_permission(Permission::Delete.bits(), false)
        .await
        .unwrap()
        .unset_class_permission(true)
        .await
        .unwrap();

    let acl = manager.acl().unwrap();
    assert_eq!(acl.aces(AceScope::Class).len(), 1);
    assert!(!acl.aces(AceScope::Class)[0].is_granting());
}

#[tokio::test]
async fn failed_mutation_writes_nothing() {
    let db = setup().await;
    let provider = DbAclProvider::new(db);
    let oid = ObjectIdentity::new(POST_CLASS, "1").unwrap();
    let sid = SecurityIdentity::role(ROLE_USER).unwrap();
    provider.create_acl(&oid).await.unwrap();

    let err = provider
        .update_acl_with(
            &oid,
            Box::new(move |acl: &mut Acl| {
                acl.insert_ace(AceScope::Object, 0, sid.clone(), 1, true)?;
                acl.insert_ace(AceScope::Object, 5, sid, 2, true)
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AclError::AceIndexOutOfBounds { index: 5, len: 1 }));

    let acl = provider.find_acl(&oid).await.unwrap();
    assert!(acl.aces(AceScope::Object).is_empty());
}

#[tokio::test]
async fn update_acl_replaces_stored_entries() {
    let db = setup().await;
    let provider = DbAclProvider::new(db);
    let oid = ObjectIdentity::new(POST_CLASS, "1").unwrap();
    let mut acl = provider.create_acl(&oid).await.unwrap();

    acl.insert_ace(AceScope::Object, 0, SecurityIdentity::role("A").unwrap(), 1, true)
        .unwrap();
    acl.insert_ace(AceScope::Object, 1, SecurityIdentity::role("B").unwrap(), 2, true)
        .unwrap();
    provider.update_acl(&acl).await.unwrap();

    acl.delete_ace(AceScope::Object, 0).unwrap();
    provider.update_acl(&acl).await.unwrap();

    let stored = provider.find_acl(&oid).await.unwrap();
    assert_eq!(stored.aces(AceScope::Object).len(), 1);
    assert_eq!(stored.aces(AceScope::Object)[0].security_identity().identifier(), "B");
    assert_eq!(stored.aces(AceScope::Object)[0].mask(), 2);
}

#[tokio::test]
async fn delete_acl_keeps_class_entries() {
    let db = setup().await;
    let posts = insert_posts(&db, &[(1, "a", "published"), (2, "b", "published")]).await;
    let mut manager = AclManager::new(DbAclProvider::new(db.clone()));

    manager.install_default_access(&posts[0]).await.unwrap();
    manager
        .load_acl(&posts[0])
        .await
        .unwrap()
        .create_security_identity(ROLE_USER)
        .unwrap()
        .set_object_permission(Permission::Edit.bits(), true)
        .await
        .unwrap();

    manager.delete_acl(&posts[0]).await.unwrap();
    assert!(manager.acl().is_none());
    manager.delete_acl(&posts[0]).await.unwrap();

    assert_eq!(entry::Entity::find().count(&db).await.unwrap(), 4);
    let other = manager.load_acl(&posts[1]).await.unwrap().acl().unwrap();
    assert_eq!(class_masks(other).len(), 4);
}

#[tokio::test]
async fn setters_require_a_loaded_acl_and_identity() {
    let db = setup().await;
    let posts = insert_posts(&db, &[(1, "a", "published")]).await;
    let mut manager = AclManager::new(DbAclProvider::new(db));

    let err = manager
        .create_security_identity(ROLE_USER)
        .unwrap()
        .set_object_permission(1, true)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AclError::AclNotLoaded));

    let mut manager = AclManager::new(manager.provider().clone());
    manager.load_acl(&posts[0]).await.unwrap();
    let err = manager.set_object_permission(1, true).await.err().unwrap();
    assert!(matches!(err, AclError::InvalidIdentity(_)));
}
