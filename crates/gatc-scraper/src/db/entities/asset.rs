//! Content-addressed canonical assets.

use sea_orm::entity::prelude::*;

/// Asset entity model. `asset_id` is the SHA-256 of the normalized PNG.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "assets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub asset_id: String,
    pub sha256: String,
    /// 64-bit average hash, hex encoded.
    pub phash: Option<String>,
    pub width_px: i32,
    pub height_px: i32,
    pub file_bytes: i64,
    pub gcs_path: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ad::Entity")]
    Ads,
}

impl Related<super::ad::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ads.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
