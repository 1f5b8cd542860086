//! OCR enrichment columns on `ads`.
//!
//! Safe to apply to a database that already has some or all of the columns.

use sea_orm::DbBackend;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

fn ocr_columns() -> [(&'static str, ColumnDef); 3] {
    [
        ("ocr_text", ColumnDef::new(Ads::OcrText).text().null().to_owned()),
        (
            "ocr_language",
            ColumnDef::new(Ads::OcrLanguage).string_len(35).null().to_owned(),
        ),
        (
            "ocr_confidence",
            ColumnDef::new(Ads::OcrConfidence).double().null().to_owned(),
        ),
    ]
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let postgres = manager.get_database_backend() == DbBackend::Postgres;

        // SQLite takes one ADD COLUMN per ALTER and has no IF NOT EXISTS form.
        for (name, mut column) in ocr_columns() {
            if manager.has_column("ads", name).await? {
                continue;
            }
            let mut alter = Table::alter();
            alter.table(Ads::Table);
            if postgres {
                alter.add_column_if_not_exists(&mut column);
            } else {
                alter.add_column(&mut column);
            }
            manager.alter_table(alter).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, _) in ocr_columns() {
            if !manager.has_column("ads", name).await? {
                continue;
            }
            manager
                .alter_table(
                    Table::alter()
                        .table(Ads::Table)
                        .drop_column(Alias::new(name))
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Ads {
    Table,
    OcrText,
    OcrLanguage,
    OcrConfidence,
}
