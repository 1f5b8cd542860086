//! Asset repository for the content-addressed `assets` table.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use super::ad_repo::AssetLink;
use super::entities::asset::{self, Column};
use super::DatabaseError;

/// Row written the first time a normalized PNG is seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub asset_id: String,
    pub phash: String,
    pub width_px: i32,
    pub height_px: i32,
    pub file_bytes: i64,
    pub gcs_path: String,
}

impl AssetRecord {
    pub fn from_link(link: &AssetLink) -> Self {
        Self {
            asset_id: link.asset_id.clone(),
            phash: link.phash.clone(),
            width_px: link.width_px,
            height_px: link.height_px,
            file_bytes: link.file_bytes,
            gcs_path: link.gcs_path.clone(),
        }
    }
}

/// Inserts the asset unless a row with the same hash exists.
///
/// Returns `true` when a new row was written.
pub async fn ensure_asset_row(
    db: &DatabaseConnection,
    record: &AssetRecord,
) -> Result<bool, DatabaseError> {
    let model = asset::ActiveModel {
        asset_id: Set(record.asset_id.clone()),
        sha256: Set(record.asset_id.clone()),
        phash: Set(Some(record.phash.clone())),
        width_px: Set(record.width_px),
        height_px: Set(record.height_px),
        file_bytes: Set(record.file_bytes),
        gcs_path: Set(record.gcs_path.clone()),
        created_at: Set(Utc::now()),
    };

    let inserted = asset::Entity::insert(model)
        .on_conflict(OnConflict::column(Column::AssetId).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;
    Ok(inserted > 0)
}

pub async fn find(
    db: &DatabaseConnection,
    asset_id: &str,
) -> Result<Option<asset::Model>, DatabaseError> {
    Ok(asset::Entity::find_by_id(asset_id.to_string()).one(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdType;
    use crate::db::ad_repo::{self, sample_link, AdRef};
    use crate::db::open_in_memory;
    use sea_orm::PaginatorTrait;

    #[tokio::test]
    async fn test_ensure_asset_row_is_idempotent() {
        let db = open_in_memory().await;
        let record = AssetRecord::from_link(&sample_link(&"e".repeat(64)));

        assert!(ensure_asset_row(&db, &record).await.unwrap());
        assert!(!ensure_asset_row(&db, &record).await.unwrap());
        assert_eq!(asset::Entity::find().count(&db).await.unwrap(), 1);

        let row = find(&db, &record.asset_id).await.unwrap().unwrap();
        assert_eq!(row.sha256, record.asset_id);
        assert_eq!(row.width_px, 300);
    }

    #[tokio::test]
    async fn test_deleting_asset_nulls_ad_reference() {
        let db = open_in_memory().await;
        let sha = "f".repeat(64);
        let ad = AdRef {
            ad_id: "CR5",
            variant_id: "v1",
            advertiser_id: "AR5",
        };
        let link = sample_link(&sha);

        ad_repo::upsert_pending(&db, AdType::Image, ad, None, "image:1").await.unwrap();
        ensure_asset_row(&db, &AssetRecord::from_link(&link)).await.unwrap();
        ad_repo::link_asset_success(&db, ad, &link).await.unwrap();

        asset::Entity::delete_by_id(sha.clone()).exec(&db).await.unwrap();

        let row = ad_repo::find(&db, "CR5", "v1").await.unwrap().unwrap();
        assert_eq!(row.asset_id, None);
        assert_eq!(row.status, "done");
        assert_eq!(row.gcs_path.as_deref(), Some(link.gcs_path.as_str()));
    }
}
