//! Initial migration for the ACL tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AclClasses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AclClasses::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AclClasses::ClassType)
                            .string_len(200)
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AclSecurityIdentities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AclSecurityIdentities::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AclSecurityIdentities::Identifier)
                            .string_len(200)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(AclSecurityIdentities::Username)
                            .boolean()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AclObjectIdentities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AclObjectIdentities::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AclObjectIdentities::ClassId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AclObjectIdentities::ObjectIdentifier)
                            .string_len(100)
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(AclObjectIdentities::Table, AclObjectIdentities::ClassId)
                            .to(AclClasses::Table, AclClasses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per (class, object); concurrent creates race on this index.
        manager
            .create_index(
                Index::create()
                    .name("uq_acl_object_identities_class_object")
                    .table(AclObjectIdentities::Table)
                    .col(AclObjectIdentities::ClassId)
                    .col(AclObjectIdentities::ObjectIdentifier)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AclEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AclEntries::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AclEntries::ClassId).integer().not_null())
                    .col(ColumnDef::new(AclEntries::ObjectIdentityId).integer())
                    .col(
                        ColumnDef::new(AclEntries::SecurityIdentityId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AclEntries::AceOrder).integer().not_null())
                    .col(ColumnDef::new(AclEntries::Mask).integer().not_null())
                    .col(ColumnDef::new(AclEntries::Granting).boolean().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(AclEntries::Table, AclEntries::ClassId)
                            .to(AclClasses::Table, AclClasses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(AclEntries::Table, AclEntries::ObjectIdentityId)
                            .to(AclObjectIdentities::Table, AclObjectIdentities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(AclEntries::Table, AclEntries::SecurityIdentityId)
                            .to(AclSecurityIdentities::Table, AclSecurityIdentities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Serves the rewriter's entry join.
        manager
            .create_index(
                Index::create()
                    .name("idx_acl_entries_class_object")
                    .table(AclEntries::Table)
                    .col(AclEntries::ClassId)
                    .col(AclEntries::ObjectIdentityId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AclEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AclObjectIdentities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AclSecurityIdentities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AclClasses::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AclClasses {
    Table,
    Id,
    ClassType,
}

#[derive(DeriveIden)]
enum AclSecurityIdentities {
    Table,
    Id,
    Identifier,
    Username,
}

#[derive(DeriveIden)]
enum AclObjectIdentities {
    Table,
    Id,
    ClassId,
    ObjectIdentifier,
}

#[derive(DeriveIden)]
enum AclEntries {
    Table,
    Id,
    ClassId,
    ObjectIdentityId,
    SecurityIdentityId,
    AceOrder,
    Mask,
    Granting,
}
