//! Database migrations.

use sea_orm_migration::prelude::*;

mod m20251001_000001_create_assets_table;
mod m20251001_000002_create_ads_table;
mod m20251001_000003_create_reporting_views;
mod m20251026_000001_add_ocr_columns_to_ads;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251001_000001_create_assets_table::Migration),
            Box::new(m20251001_000002_create_ads_table::Migration),
            Box::new(m20251001_000003_create_reporting_views::Migration),
            Box::new(m20251026_000001_add_ocr_columns_to_ads::Migration),
        ]
    }
}
