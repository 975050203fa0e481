use sea_orm::entity::prelude::*;

/// Product definition sold or hosted on one platform.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub platform: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_products::Entity")]
    UserProducts,
}

impl Related<super::user_products::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserProducts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
