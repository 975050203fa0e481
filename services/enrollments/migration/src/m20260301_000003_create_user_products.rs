use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserProducts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserProducts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserProducts::UserId).uuid().not_null())
                    .col(ColumnDef::new(UserProducts::ProductId).uuid().not_null())
                    .col(ColumnDef::new(UserProducts::Platform).string().not_null())
                    .col(ColumnDef::new(UserProducts::PlatformUserId).string().null())
                    .col(
                        ColumnDef::new(UserProducts::Status)
                            .string()
                            .not_null()
                            .default("ACTIVE"),
                    )
                    .col(
                        ColumnDef::new(UserProducts::Progress)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(UserProducts::Engagement)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(UserProducts::EnrolledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserProducts::Tags)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(UserProducts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(UserProducts::Table, UserProducts::UserId)
                            .to(LegacyUsers::Table, LegacyUsers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(UserProducts::Table, UserProducts::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .table(UserProducts::Table)
                    .col(UserProducts::UserId)
                    .name("idx_user_products_user_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserProducts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum UserProducts {
    Table,
    Id,
    UserId,
    ProductId,
    Platform,
    PlatformUserId,
    Status,
    Progress,
    Engagement,
    EnrolledAt,
    Tags,
    CreatedAt,
}

#[derive(Iden)]
enum LegacyUsers {
    Table,
    Id,
}

#[derive(Iden)]
enum Products {
    Table,
    Id,
}
