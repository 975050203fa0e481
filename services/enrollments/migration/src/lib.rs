use sea_orm_migration::prelude::*;

mod m20260301_000001_create_legacy_users;
mod m20260301_000002_create_products;
mod m20260301_000003_create_user_products;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_legacy_users::Migration),
            Box::new(m20260301_000002_create_products::Migration),
            Box::new(m20260301_000003_create_user_products::Migration),
        ]
    }
}
