//! Ad repository — writes and lookups on the `ads` table.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
};

use super::entities::ad::{self, Column};
use super::status::AdStatus;
use super::DatabaseError;
use crate::config::AdType;

/// Identifies one `(ad_id, variant_id)` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdRef<'a> {
    pub ad_id: &'a str,
    pub variant_id: &'a str,
    pub advertiser_id: &'a str,
}

/// Everything recorded when a variant is captured and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetLink {
    /// SHA-256 of the normalized PNG; also the `assets` key.
    pub asset_id: String,
    pub render_method: String,
    pub width_px: i32,
    pub height_px: i32,
    pub file_bytes: i64,
    pub phash: String,
    pub gcs_path: String,
    pub local_path: Option<String>,
    pub capture_method: String,
    pub capture_target: String,
    pub click_url: Option<String>,
    pub scraper_version: String,
    pub ocr_text: Option<String>,
    pub ocr_language: Option<String>,
    pub ocr_confidence: Option<f64>,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> DatabaseError {
    DatabaseError::InvalidRecord {
        field,
        reason: reason.into(),
    }
}

pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Rejects links that would leave a `done` row without a usable asset.
pub fn validate_link(link: &AssetLink) -> Result<(), DatabaseError> {
    if !is_sha256_hex(&link.asset_id) {
        return Err(invalid("asset_id", "must be 64-char lowercase hex"));
    }
    if link.width_px <= 0 {
        return Err(invalid("width_px", format!("{} is not positive", link.width_px)));
    }
    if link.height_px <= 0 {
        return Err(invalid("height_px", format!("{} is not positive", link.height_px)));
    }
    if link.file_bytes <= 0 {
        return Err(invalid("file_bytes", format!("{} is not positive", link.file_bytes)));
    }
    if !link.gcs_path.starts_with("gs://") {
        return Err(invalid("gcs_path", "must be a gs:// path"));
    }
    if link.render_method.is_empty() {
        return Err(invalid("render_method", "required"));
    }
    if link.capture_method.is_empty() {
        return Err(invalid("capture_method", "required"));
    }
    Ok(())
}

/// Inserts a pending row, or refreshes advertiser, version and source URL
/// of an existing one. The status of an existing row is left alone.
pub async fn upsert_pending(
    db: &DatabaseConnection,
    ad_type: AdType,
    ad: AdRef<'_>,
    source_url: Option<&str>,
    scraper_version: &str,
) -> Result<(), DatabaseError> {
    let model = ad::ActiveModel {
        ad_id: Set(ad.ad_id.to_string()),
        variant_id: Set(ad.variant_id.to_string()),
        ad_type: Set(ad_type.as_str().to_string()),
        advertiser_id: Set(Some(ad.advertiser_id.to_string())),
        asset_url: Set(source_url.unwrap_or_default().to_string()),
        source_url: Set(source_url.map(str::to_string)),
        status: Set(AdStatus::Pending.as_str().to_string()),
        scraper_version: Set(Some(scraper_version.to_string())),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };

    let mut refreshed = vec![Column::AdvertiserId, Column::ScraperVersion, Column::UpdatedAt];
    if source_url.is_some() {
        refreshed.extend([Column::AssetUrl, Column::SourceUrl]);
    }

    ad::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([Column::AdId, Column::VariantId])
                .update_columns(refreshed)
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Marks a row `done` and attaches its asset. OCR fields and the click URL
/// only overwrite stored values when present.
///
/// Returns the number of rows updated; zero means no pending row existed.
pub async fn link_asset_success(
    db: &DatabaseConnection,
    ad: AdRef<'_>,
    link: &AssetLink,
) -> Result<u64, DatabaseError> {
    validate_link(link)?;
    let now = Utc::now();

    let mut update = ad::Entity::update_many()
        .col_expr(Column::RenderMethod, Expr::value(link.render_method.clone()))
        .col_expr(Column::WidthPx, Expr::value(link.width_px))
        .col_expr(Column::HeightPx, Expr::value(link.height_px))
        .col_expr(Column::FileBytes, Expr::value(link.file_bytes))
        .col_expr(Column::GcsPath, Expr::value(link.gcs_path.clone()))
        .col_expr(Column::AssetId, Expr::value(link.asset_id.clone()))
        .col_expr(Column::FileHash, Expr::value(link.asset_id.clone()))
        .col_expr(Column::Phash, Expr::value(link.phash.clone()))
        .col_expr(Column::CaptureMethod, Expr::value(link.capture_method.clone()))
        .col_expr(Column::CaptureTarget, Expr::value(link.capture_target.clone()))
        .col_expr(Column::Status, Expr::value(AdStatus::Done.as_str()))
        .col_expr(Column::LastError, Expr::value(Option::<String>::None))
        .col_expr(Column::ScrapedAt, Expr::value(now))
        .col_expr(Column::ScraperVersion, Expr::value(link.scraper_version.clone()))
        .col_expr(Column::UpdatedAt, Expr::value(now));

    if let Some(path) = &link.local_path {
        update = update.col_expr(Column::LocalPath, Expr::value(path.clone()));
    }
    if let Some(url) = &link.click_url {
        update = update.col_expr(Column::ClickUrl, Expr::value(url.clone()));
    }
    if let Some(text) = &link.ocr_text {
        update = update.col_expr(Column::OcrText, Expr::value(text.clone()));
    }
    if let Some(language) = &link.ocr_language {
        update = update.col_expr(Column::OcrLanguage, Expr::value(language.clone()));
    }
    if let Some(confidence) = link.ocr_confidence {
        update = update.col_expr(Column::OcrConfidence, Expr::value(confidence));
    }

    let result = update
        .filter(Column::AdId.eq(ad.ad_id))
        .filter(Column::VariantId.eq(ad.variant_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Sets `status` and `last_error` of a row.
pub async fn record_status(
    db: &DatabaseConnection,
    ad: AdRef<'_>,
    status: AdStatus,
    last_error: Option<&str>,
) -> Result<u64, DatabaseError> {
    let result = ad::Entity::update_many()
        .col_expr(Column::Status, Expr::value(status.as_str()))
        .col_expr(Column::LastError, Expr::value(last_error.map(str::to_string)))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::AdId.eq(ad.ad_id))
        .filter(Column::VariantId.eq(ad.variant_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Shortcut for [`record_status`] with [`AdStatus::Error`].
pub async fn record_error(
    db: &DatabaseConnection,
    ad: AdRef<'_>,
    message: &str,
) -> Result<u64, DatabaseError> {
    record_status(db, ad, AdStatus::Error, Some(message)).await
}

/// Stores the click-through URL. Writing the same URL again is harmless.
pub async fn persist_click_url(
    db: &DatabaseConnection,
    ad: AdRef<'_>,
    click_url: &str,
) -> Result<u64, DatabaseError> {
    let result = ad::Entity::update_many()
        .col_expr(Column::ClickUrl, Expr::value(click_url))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::AdId.eq(ad.ad_id))
        .filter(Column::VariantId.eq(ad.variant_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

pub async fn find(
    db: &DatabaseConnection,
    ad_id: &str,
    variant_id: &str,
) -> Result<Option<ad::Model>, DatabaseError> {
    Ok(ad::Entity::find_by_id((ad_id.to_string(), variant_id.to_string()))
        .one(db)
        .await?)
}

/// Status of a row, if the row exists.
pub async fn find_status(
    db: &DatabaseConnection,
    ad_id: &str,
    variant_id: &str,
) -> Result<Option<String>, DatabaseError> {
    Ok(ad::Entity::find()
        .select_only()
        .column(Column::Status)
        .filter(Column::AdId.eq(ad_id))
        .filter(Column::VariantId.eq(variant_id))
        .into_tuple::<String>()
        .one(db)
        .await?)
}

#[cfg(test)]
pub(crate) fn sample_link(sha: &str) -> AssetLink {
    AssetLink {
        asset_id: sha.to_string(),
        render_method: "sadbundle".into(),
        width_px: 300,
        height_px: 250,
        file_bytes: 1234,
        phash: "00ff00ff00ff00ff".into(),
        gcs_path: format!("gs://bucket/assets/image/{}/{}.png", &sha[..2], sha),
        local_path: None,
        capture_method: "img".into(),
        capture_target: "frame:0".into(),
        click_url: None,
        scraper_version: "image:2025-10-26.1".into(),
        ocr_text: None,
        ocr_language: None,
        ocr_confidence: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::asset_repo::{ensure_asset_row, AssetRecord};
    use crate::db::open_in_memory;
    use sea_orm::PaginatorTrait;

    const AD: AdRef<'static> = AdRef {
        ad_id: "CR111",
        variant_id: "v1",
        advertiser_id: "AR222",
    };

    fn link(sha: &str) -> AssetLink {
        sample_link(sha)
    }

    #[tokio::test]
    async fn test_upsert_pending_creates_one_row_per_variant() {
        let db = open_in_memory().await;

        upsert_pending(&db, AdType::Image, AD, Some("https://a/1"), "image:1").await.unwrap();
        upsert_pending(&db, AdType::Image, AD, None, "image:2").await.unwrap();
        let v2 = AdRef { variant_id: "v2", ..AD };
        upsert_pending(&db, AdType::Image, v2, None, "image:2").await.unwrap();

        assert_eq!(ad::Entity::find().count(&db).await.unwrap(), 2);
        let row = find(&db, "CR111", "v1").await.unwrap().unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.ad_type, "IMAGE");
        assert_eq!(row.scraper_version.as_deref(), Some("image:2"));
        // A missing source URL keeps the stored one.
        assert_eq!(row.source_url.as_deref(), Some("https://a/1"));
        assert_eq!(row.asset_url, "https://a/1");
    }

    #[tokio::test]
    async fn test_primary_key_rejects_duplicate_insert() {
        let db = open_in_memory().await;
        let model = || ad::ActiveModel {
            ad_id: Set("CR1".into()),
            variant_id: Set("".into()),
            ad_type: Set("TEXT".into()),
            asset_url: Set("https://a".into()),
            status: Set("pending".into()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };

        ad::Entity::insert(model()).exec_without_returning(&db).await.unwrap();
        assert!(ad::Entity::insert(model()).exec_without_returning(&db).await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_keeps_done_status() {
        let db = open_in_memory().await;
        let sha = "a".repeat(64);
        upsert_pending(&db, AdType::Image, AD, None, "image:1").await.unwrap();
        ensure_asset_row(&db, &AssetRecord::from_link(&link(&sha))).await.unwrap();
        link_asset_success(&db, AD, &link(&sha)).await.unwrap();

        upsert_pending(&db, AdType::Image, AD, None, "image:2").await.unwrap();
        assert_eq!(find_status(&db, "CR111", "v1").await.unwrap().as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_link_asset_success_fills_row() {
        let db = open_in_memory().await;
        let sha = "b".repeat(64);
        upsert_pending(&db, AdType::Image, AD, None, "image:1").await.unwrap();
        record_error(&db, AD, "timeout").await.unwrap();
        ensure_asset_row(&db, &AssetRecord::from_link(&link(&sha))).await.unwrap();

        let mut l = link(&sha);
        l.ocr_text = Some("Vote".into());
        l.ocr_confidence = Some(0.9);
        l.click_url = Some("https://example.com/".into());
        assert_eq!(link_asset_success(&db, AD, &l).await.unwrap(), 1);

        let row = find(&db, "CR111", "v1").await.unwrap().unwrap();
        assert_eq!(row.status, "done");
        assert_eq!(row.last_error, None);
        assert_eq!(row.asset_id.as_deref(), Some(sha.as_str()));
        assert_eq!(row.file_hash.as_deref(), Some(sha.as_str()));
        assert_eq!(row.width_px, Some(300));
        assert_eq!(row.ocr_text.as_deref(), Some("Vote"));
        assert_eq!(row.ocr_confidence, Some(0.9));
        assert!(row.scraped_at.is_some());

        // Absent OCR on a later capture keeps the earlier text.
        assert_eq!(link_asset_success(&db, AD, &link(&sha)).await.unwrap(), 1);
        let row = find(&db, "CR111", "v1").await.unwrap().unwrap();
        assert_eq!(row.ocr_text.as_deref(), Some("Vote"));
        assert_eq!(row.click_url.as_deref(), Some("https://example.com/"));
    }

    #[tokio::test]
    async fn test_link_without_row_updates_nothing() {
        let db = open_in_memory().await;
        let sha = "c".repeat(64);
        assert_eq!(link_asset_success(&db, AD, &link(&sha)).await.unwrap(), 0);
    }

    #[test]
    fn test_validate_link() {
        let sha = "d".repeat(64);
        assert!(validate_link(&link(&sha)).is_ok());

        let mut bad = link(&sha);
        bad.asset_id = "D".repeat(64);
        assert!(matches!(
            validate_link(&bad),
            Err(DatabaseError::InvalidRecord { field: "asset_id", .. })
        ));

        let mut bad = link(&sha);
        bad.width_px = 0;
        assert!(validate_link(&bad).is_err());

        let mut bad = link(&sha);
        bad.file_bytes = 0;
        assert!(validate_link(&bad).is_err());

        let mut bad = link(&sha);
        bad.gcs_path = "/tmp/x.png".into();
        assert!(validate_link(&bad).is_err());

        let mut bad = link(&sha);
        bad.capture_method.clear();
        assert!(validate_link(&bad).is_err());
    }

    #[tokio::test]
    async fn test_record_status_and_click_url() {
        let db = open_in_memory().await;
        upsert_pending(&db, AdType::Text, AD, None, "text:1").await.unwrap();

        record_status(&db, AD, AdStatus::NotFound, None).await.unwrap();
        persist_click_url(&db, AD, "https://example.org/").await.unwrap();
        persist_click_url(&db, AD, "https://example.org/").await.unwrap();

        let row = find(&db, "CR111", "v1").await.unwrap().unwrap();
        assert_eq!(row.status, "not_found");
        assert_eq!(row.click_url.as_deref(), Some("https://example.org/"));
        assert_eq!(find_status(&db, "CR999", "v1").await.unwrap(), None);
    }
}
