//! One row per captured creative variant.

use sea_orm::entity::prelude::*;

/// Ad entity model, keyed by `(ad_id, variant_id)`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ads")]
pub struct Model {
    /// Transparency Center creative id (`CR...`).
    #[sea_orm(primary_key, auto_increment = false)]
    pub ad_id: String,
    /// `v1`, `v2`, ... for rendered variants; empty when the type has none.
    #[sea_orm(primary_key, auto_increment = false)]
    pub variant_id: String,
    /// `IMAGE` or `TEXT`.
    pub ad_type: String,
    pub advertiser_id: Option<String>,
    /// Page the creative was captured from.
    pub asset_url: String,
    pub source_url: Option<String>,
    /// SHA-256 of the normalized PNG.
    pub file_hash: Option<String>,
    pub local_path: Option<String>,
    pub gcs_path: Option<String>,
    pub asset_id: Option<String>,
    pub render_method: Option<String>,
    pub width_px: Option<i32>,
    pub height_px: Option<i32>,
    pub file_bytes: Option<i64>,
    pub phash: Option<String>,
    pub capture_method: Option<String>,
    pub capture_target: Option<String>,
    pub click_url: Option<String>,
    #[sea_orm(default_value = "pending")]
    pub status: String,
    pub last_error: Option<String>,
    pub scraper_version: Option<String>,
    pub scraped_at: Option<DateTimeUtc>,
    pub updated_at: DateTimeUtc,
    #[sea_orm(column_type = "Text", nullable)]
    pub ocr_text: Option<String>,
    /// BCP-47 tag.
    pub ocr_language: Option<String>,
    /// Mean recognition confidence in `0.0..=1.0`.
    pub ocr_confidence: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::asset::Entity",
        from = "Column::AssetId",
        to = "super::asset::Column::AssetId",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    Asset,
}

impl Related<super::asset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Asset.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
