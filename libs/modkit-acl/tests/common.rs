#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use modkit_acl::create_schema;
use sea_orm::{
    ActiveValue::Set, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    Schema,
};

pub const POST_CLASS: &str = "app::Post";

pub mod post {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "posts")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: i32,
        pub title: String,
        pub status: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl modkit_acl::AclEntity for Entity {
        fn acl_class() -> &'static str {
            super::POST_CLASS
        }

        fn identifier_col() -> Self::Column {
            Column::Id
        }
    }

    impl modkit_acl::DomainObject for Model {
        fn acl_type(&self) -> &str {
            super::POST_CLASS
        }

        fn acl_identifier(&self) -> String {
            self.id.to_string()
        }
    }
}

/// In-memory sqlite with the ACL store and an empty `posts` table.
///
/// One connection only: every pooled connection would open its own in-memory database.
pub async fn setup() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.expect("connect sqlite");

    create_schema(&db).await.expect("ACL schema");

    let backend = db.get_database_backend();
    let posts = Schema::new(backend).create_table_from_entity(post::Entity);
    db.execute(backend.build(&posts)).await.expect("posts table");
    db
}

pub async fn insert_posts(db: &DatabaseConnection, posts: &[(i32, &str, &str)]) -> Vec<post::Model> {
    let models: Vec<post::Model> = posts
        .iter()
        .map(|(id, title, status)| post::Model {
            id: *id,
            title: (*title).to_owned(),
            status: (*status).to_owned(),
        })
        .collect();

    post::Entity::insert_many(models.iter().map(|m| post::ActiveModel {
        id: Set(m.id),
        title: Set(m.title.clone()),
        status: Set(m.status.clone()),
    }))
    .exec_without_returning(db)
    .await
    .expect("insert posts");
    models
}
