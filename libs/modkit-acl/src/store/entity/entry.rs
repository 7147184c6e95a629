use sea_orm::entity::prelude::*;

/// One ACE row. `object_identity_id` is `NULL` for class-scoped entries.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "acl_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub class_id: i32,
    pub object_identity_id: Option<i32>,
    pub security_identity_id: i32,
    pub ace_order: i32,
    pub mask: i32,
    pub granting: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
