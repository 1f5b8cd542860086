//! Canonical asset table, one row per distinct normalized PNG.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Assets::Table)
                    .if_not_exists()
                    .col(string_len(Assets::AssetId, 64).primary_key())
                    .col(string_len(Assets::Sha256, 64))
                    .col(string_len_null(Assets::Phash, 16))
                    .col(integer(Assets::WidthPx))
                    .col(integer(Assets::HeightPx))
                    .col(big_integer(Assets::FileBytes))
                    .col(text(Assets::GcsPath))
                    .col(
                        timestamp_with_time_zone(Assets::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Assets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Assets {
    Table,
    AssetId,
    Sha256,
    Phash,
    WidthPx,
    HeightPx,
    FileBytes,
    GcsPath,
    CreatedAt,
}
