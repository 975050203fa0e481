use sea_orm::entity::prelude::*;

/// Legacy (V1) user document. Platform data lives inside `document` as nested
/// sub-objects keyed by platform name, plus a few top-level platform ids.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "legacy_users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub email: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub document: Json,
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
