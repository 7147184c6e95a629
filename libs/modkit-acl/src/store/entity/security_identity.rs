use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "acl_security_identities")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// `Class-username` for users, the role name for roles.
    #[sea_orm(unique)]
    pub identifier: String,
    /// `true` for user identities.
    pub username: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
