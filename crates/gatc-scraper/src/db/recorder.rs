//! Dry-run aware front for the repositories.
//!
//! Reads always reach the database. Writes are replaced by a `dry_run_*`
//! log line when the run is a dry run.

use sea_orm::DatabaseConnection;

use super::ad_repo::{self, AdRef, AssetLink};
use super::asset_repo::{self, AssetRecord};
use super::status::{AdStatus, VARIATION_UNAVAILABLE};
use super::DatabaseError;
use crate::config::AdType;

#[derive(Clone)]
pub struct Recorder {
    db: DatabaseConnection,
    dry_run: bool,
}

impl Recorder {
    pub fn new(db: DatabaseConnection, dry_run: bool) -> Self {
        Self { db, dry_run }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn upsert_pending(
        &self,
        ad_type: AdType,
        ad: AdRef<'_>,
        source_url: Option<&str>,
        scraper_version: &str,
    ) -> Result<(), DatabaseError> {
        if self.dry_run {
            tracing::info!(
                event = "dry_run_upsert_pending",
                ad_type = ad_type.as_str(),
                ad_id = ad.ad_id,
                advertiser_id = ad.advertiser_id,
                variant_id = ad.variant_id,
            );
            return Ok(());
        }
        ad_repo::upsert_pending(&self.db, ad_type, ad, source_url, scraper_version).await
    }

    pub async fn ensure_asset_row(&self, record: &AssetRecord) -> Result<(), DatabaseError> {
        if self.dry_run {
            return Ok(());
        }
        if asset_repo::ensure_asset_row(&self.db, record).await? {
            tracing::debug!(event = "asset_row_created", asset_id = %record.asset_id);
        }
        Ok(())
    }

    /// Marks the row done. Returns whether a stored row was linked, which is
    /// never the case on a dry run.
    pub async fn link_asset_success(
        &self,
        ad_type: AdType,
        ad: AdRef<'_>,
        link: &AssetLink,
    ) -> Result<bool, DatabaseError> {
        if self.dry_run {
            tracing::info!(
                event = "dry_run_link",
                ad_type = ad_type.as_str(),
                advertiser_id = ad.advertiser_id,
                ad_id = ad.ad_id,
                variant_id = ad.variant_id,
                asset_id = %link.asset_id,
                render_method = %link.render_method,
            );
            return Ok(false);
        }

        if ad_repo::link_asset_success(&self.db, ad, link).await? == 0 {
            tracing::warn!(
                event = "link_missing_row",
                ad_id = ad.ad_id,
                variant_id = ad.variant_id,
            );
            return Ok(false);
        }
        tracing::info!(
            event = "ad_done",
            ad_type = ad_type.as_str(),
            advertiser_id = ad.advertiser_id,
            ad_id = ad.ad_id,
            variant_id = ad.variant_id,
            width = link.width_px,
            height = link.height_px,
            bytes = link.file_bytes,
            asset_id = %link.asset_id,
            gcs_path = %link.gcs_path,
            render_method = %link.render_method,
            capture_method = %link.capture_method,
            capture_target = %link.capture_target,
            ocr_chars = link.ocr_text.as_ref().map(|t| t.chars().count()).unwrap_or(0),
            ocr_language = link.ocr_language.as_deref(),
            ocr_confidence = link.ocr_confidence,
        );
        Ok(true)
    }

    pub async fn record_status(
        &self,
        ad: AdRef<'_>,
        status: AdStatus,
        last_error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        if self.dry_run {
            tracing::info!(
                event = "dry_run_status",
                advertiser_id = ad.advertiser_id,
                ad_id = ad.ad_id,
                variant_id = ad.variant_id,
                status = status.as_str(),
                last_error = last_error,
            );
            return Ok(());
        }

        ad_repo::record_status(&self.db, ad, status, last_error).await?;
        match status {
            AdStatus::RemovedForPolicyViolation | AdStatus::RateLimited | AdStatus::NotFound => {
                tracing::info!(
                    event = "ad_terminal",
                    advertiser_id = ad.advertiser_id,
                    ad_id = ad.ad_id,
                    variant_id = ad.variant_id,
                    status = status.as_str(),
                );
            }
            AdStatus::Error if last_error == Some(VARIATION_UNAVAILABLE) => {
                tracing::info!(
                    event = "ad_terminal",
                    advertiser_id = ad.advertiser_id,
                    ad_id = ad.ad_id,
                    variant_id = ad.variant_id,
                    status = VARIATION_UNAVAILABLE,
                );
            }
            AdStatus::Error => {
                tracing::error!(
                    event = "ad_error",
                    advertiser_id = ad.advertiser_id,
                    ad_id = ad.ad_id,
                    variant_id = ad.variant_id,
                    error = last_error.unwrap_or(""),
                );
            }
            AdStatus::Pending | AdStatus::Done => {}
        }
        Ok(())
    }

    pub async fn record_error(&self, ad: AdRef<'_>, message: &str) -> Result<(), DatabaseError> {
        self.record_status(ad, AdStatus::Error, Some(message)).await
    }

    pub async fn persist_click_url(
        &self,
        ad: AdRef<'_>,
        click_url: &str,
    ) -> Result<(), DatabaseError> {
        if click_url.is_empty() {
            return Ok(());
        }
        if self.dry_run {
            tracing::info!(
                event = "dry_run_click_url",
                advertiser_id = ad.advertiser_id,
                ad_id = ad.ad_id,
                variant_id = ad.variant_id,
                click_url = click_url,
            );
            return Ok(());
        }
        ad_repo::persist_click_url(&self.db, ad, click_url).await?;
        tracing::info!(
            event = "click_url_saved",
            advertiser_id = ad.advertiser_id,
            ad_id = ad.ad_id,
            variant_id = ad.variant_id,
            click_url = click_url,
        );
        Ok(())
    }

    pub async fn status_of(
        &self,
        ad_id: &str,
        variant_id: &str,
    ) -> Result<Option<String>, DatabaseError> {
        ad_repo::find_status(&self.db, ad_id, variant_id).await
    }
}
