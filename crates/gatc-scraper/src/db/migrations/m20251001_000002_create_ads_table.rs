//! Ad rows keyed by `(ad_id, variant_id)`.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ads::Table)
                    .if_not_exists()
                    .col(string(Ads::AdId))
                    // Part of the primary key, so empty rather than NULL for
                    // types without variants.
                    .col(string(Ads::VariantId).default(""))
                    .col(string(Ads::AdType))
                    .col(string_null(Ads::AdvertiserId))
                    .col(text(Ads::AssetUrl).default(""))
                    .col(text_null(Ads::SourceUrl))
                    .col(string_len_null(Ads::FileHash, 64))
                    .col(text_null(Ads::LocalPath))
                    .col(text_null(Ads::GcsPath))
                    .col(string_len_null(Ads::AssetId, 64))
                    .col(string_null(Ads::RenderMethod))
                    .col(integer_null(Ads::WidthPx))
                    .col(integer_null(Ads::HeightPx))
                    .col(big_integer_null(Ads::FileBytes))
                    .col(string_len_null(Ads::Phash, 16))
                    .col(string_null(Ads::CaptureMethod))
                    .col(text_null(Ads::CaptureTarget))
                    .col(text_null(Ads::ClickUrl))
                    .col(string(Ads::Status).default("pending"))
                    .col(text_null(Ads::LastError))
                    .col(string_null(Ads::ScraperVersion))
                    .col(timestamp_with_time_zone_null(Ads::ScrapedAt))
                    .col(
                        timestamp_with_time_zone(Ads::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(Index::create().col(Ads::AdId).col(Ads::VariantId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ads_asset_id")
                            .from(Ads::Table, Ads::AssetId)
                            .to(Assets::Table, Assets::AssetId)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Lifecycle queries and the streaming skip filter.
        manager
            .create_index(
                Index::create()
                    .name("idx_ads_status")
                    .table(Ads::Table)
                    .col(Ads::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ads_asset_id")
                    .table(Ads::Table)
                    .col(Ads::AssetId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Ads::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Ads {
    Table,
    AdId,
    VariantId,
    AdType,
    AdvertiserId,
    AssetUrl,
    SourceUrl,
    FileHash,
    LocalPath,
    GcsPath,
    AssetId,
    RenderMethod,
    WidthPx,
    HeightPx,
    FileBytes,
    Phash,
    CaptureMethod,
    CaptureTarget,
    ClickUrl,
    Status,
    LastError,
    ScraperVersion,
    ScrapedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Assets {
    Table,
    AssetId,
}
