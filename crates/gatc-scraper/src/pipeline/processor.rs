//! Per-ad processing: render, store every captured variant, record outcome.

use tracing::Instrument;

use crate::capture::{CapturedVariant, RenderOutcome, TerminalStatus};
use crate::config::PRIMARY_VARIANT_ID;
use crate::db::ad_repo::{AdRef, AssetLink};
use crate::db::asset_repo::AssetRecord;
use crate::error::{CaptureError, ScraperError};
use crate::hashing::normalize_and_hash;
use crate::logging::ad_span;
use crate::metadata::AssetMetadata;
use crate::ocr::{sanitize_ocr_text, OcrProcessor, OcrResult, MAX_OCR_TEXT_CHARS};
use crate::source::AdTarget;
use crate::storage::{canonical_asset_path, upload_asset};
use crate::urls::{normalize_click_url, select_primary_click_url};

use super::context::PipelineContext;
use super::error::PipelineError;

/// `last_error` when the renderer found nothing to capture.
pub const NO_VARIANTS: &str = "no_variants";
/// Outcome message when every captured variant failed to store.
pub const NO_VARIANT_CAPTURED: &str = "no_variant_captured";

/// Result of one attempt at an ad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdOutcome {
    /// At least one variant stored.
    Done { variants: usize },
    Terminal(TerminalStatus),
    Error(String),
    /// The renderer lost its session; the attempt did not count.
    Restart(String),
}

impl AdOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdOutcome::Done { .. } => "done",
            AdOutcome::Terminal(_) => "terminal",
            AdOutcome::Error(_) => "error",
            AdOutcome::Restart(_) => "restart",
        }
    }

    /// Done and terminal outcomes are never retried.
    pub fn is_final(&self) -> bool {
        matches!(self, AdOutcome::Done { .. } | AdOutcome::Terminal(_))
    }
}

/// Processes one ad end to end. Failures are recorded on the ad's rows and
/// reported through the outcome, never returned.
pub async fn process_ad(ctx: &PipelineContext, target: &AdTarget) -> AdOutcome {
    let span = ad_span(&target.ad_id, &target.advertiser_id);
    async {
        tracing::info!(event = "ad_start", ad_url = %target.ad_url);

        let primary = AdRef {
            ad_id: &target.ad_id,
            variant_id: PRIMARY_VARIANT_ID,
            advertiser_id: &target.advertiser_id,
        };

        let outcome = match render_and_store(ctx, target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!("exception: {}", e);
                if let Err(db_err) = ctx.recorder.record_error(primary, &message).await {
                    tracing::error!(event = "record_error_failed", error = %db_err);
                }
                AdOutcome::Error(message)
            }
        };

        match &outcome {
            AdOutcome::Done { variants } => {
                tracing::info!(event = "ad_end", outcome = outcome.as_str(), variants = *variants)
            }
            AdOutcome::Terminal(status) => {
                tracing::info!(event = "ad_end", outcome = outcome.as_str(), status = status.as_str())
            }
            AdOutcome::Error(reason) | AdOutcome::Restart(reason) => {
                tracing::info!(event = "ad_end", outcome = outcome.as_str(), reason = %reason)
            }
        }
        outcome
    }
    .instrument(span)
    .await
}

async fn render_and_store(
    ctx: &PipelineContext,
    target: &AdTarget,
) -> Result<AdOutcome, ScraperError> {
    let config = &ctx.config;
    let primary = AdRef {
        ad_id: &target.ad_id,
        variant_id: PRIMARY_VARIANT_ID,
        advertiser_id: &target.advertiser_id,
    };

    ctx.recorder
        .upsert_pending(config.ad_type, primary, Some(&target.ad_url), &config.scraper_version)
        .await?;

    let variants = match ctx.renderer.render(target).await {
        Ok(RenderOutcome::Terminal(status)) => {
            let (status_value, last_error) = status.record();
            ctx.recorder
                .record_status(primary, status_value, last_error)
                .await?;
            return Ok(AdOutcome::Terminal(status));
        }
        Ok(RenderOutcome::Variants(variants)) => variants,
        Err(CaptureError::RestartRequired(reason)) => return Ok(AdOutcome::Restart(reason)),
        Err(e) => return Err(e.into()),
    };

    if variants.is_empty() {
        ctx.recorder.record_error(primary, NO_VARIANTS).await?;
        return Ok(AdOutcome::Error(NO_VARIANTS.to_string()));
    }

    let mut stored = 0usize;
    for (idx, variant) in variants.iter().enumerate() {
        let variant_id = format!("v{}", idx + 1);
        let ad = AdRef {
            ad_id: &target.ad_id,
            variant_id: &variant_id,
            advertiser_id: &target.advertiser_id,
        };
        if idx > 0 {
            ctx.recorder
                .upsert_pending(config.ad_type, ad, Some(&target.ad_url), &config.scraper_version)
                .await?;
        }

        match finalize_capture(ctx, ad, variant).await {
            Ok(_) => stored += 1,
            Err(e) => {
                tracing::warn!(event = "variant_store_error", variant_id = %variant_id, error = %e);
                ctx.recorder
                    .record_error(ad, &format!("exception: {}", e))
                    .await?;
            }
        }
    }

    if stored == 0 {
        return Ok(AdOutcome::Error(NO_VARIANT_CAPTURED.to_string()));
    }
    Ok(AdOutcome::Done { variants: stored })
}

/// Stores one captured variant and links it to its ad row.
///
/// Normalize and hash, OCR (skipped on a dry run), upload to the canonical
/// path, insert the asset row, save the click URL, then mark the row done.
pub async fn finalize_capture(
    ctx: &PipelineContext,
    ad: AdRef<'_>,
    variant: &CapturedVariant,
) -> Result<AssetLink, PipelineError> {
    let config = &ctx.config;
    let norm = normalize_and_hash(&variant.bytes, true)?;

    let ocr = if config.dry_run {
        OcrResult::default()
    } else {
        run_ocr(ctx.ocr.clone(), norm.png.clone()).await
    };
    let ocr_text = sanitize_ocr_text(ocr.text.as_deref(), MAX_OCR_TEXT_CHARS);

    let asset_id = norm.sha256.clone();
    let path = canonical_asset_path(&config.gcs_bucket, config.ad_type, &asset_id);
    let click_url = primary_click_url(&variant.click_urls);

    let metadata = AssetMetadata {
        ad_type: config.ad_type,
        ad_id: ad.ad_id.to_string(),
        advertiser_id: ad.advertiser_id.to_string(),
        variant_id: ad.variant_id.to_string(),
        render_method: variant.render_method.clone(),
        capture_method: variant.capture_method.clone(),
        capture_target: variant.capture_target.clone(),
        width: norm.width,
        height: norm.height,
        sha256: asset_id.clone(),
        phash: norm.phash.clone(),
        scraper_version: config.scraper_version.clone(),
        click_url: click_url.clone(),
        source_url: variant.source_url.clone(),
    };
    let stored = upload_asset(ctx.store.as_ref(), &path, &norm.png, &metadata, config.dry_run).await?;

    let dims = |w: u32, h: u32| PipelineError::Dimensions { width: w, height: h };
    let link = AssetLink {
        asset_id,
        render_method: variant.render_method.clone(),
        width_px: i32::try_from(norm.width).map_err(|_| dims(norm.width, norm.height))?,
        height_px: i32::try_from(norm.height).map_err(|_| dims(norm.width, norm.height))?,
        file_bytes: norm.png.len() as i64,
        phash: norm.phash,
        gcs_path: stored.gcs_path,
        local_path: stored.local_path,
        capture_method: variant.capture_method.clone(),
        capture_target: variant.capture_target.clone(),
        click_url: click_url.clone(),
        scraper_version: config.scraper_version.clone(),
        ocr_text,
        ocr_language: ocr.language,
        ocr_confidence: ocr.confidence,
    };

    ctx.recorder.ensure_asset_row(&AssetRecord::from_link(&link)).await?;

    if let Some(url) = &click_url {
        tracing::info!(event = "click_url", variant_id = ad.variant_id, click_url = %url);
        ctx.recorder.persist_click_url(ad, url).await?;
    }

    ctx.recorder
        .link_asset_success(config.ad_type, ad, &link)
        .await?;
    Ok(link)
}

/// First captured click URL, reduced to the advertiser landing page.
pub fn primary_click_url<S: AsRef<str>>(urls: &[S]) -> Option<String> {
    select_primary_click_url(urls).and_then(normalize_click_url)
}

/// Tesseract is blocking; failures only cost the OCR fields.
async fn run_ocr(ocr: OcrProcessor, png: Vec<u8>) -> OcrResult {
    match tokio::task::spawn_blocking(move || ocr.extract(&png)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::warn!(event = "ocr_failed", error = %e);
            OcrResult::default()
        }
        Err(e) => {
            tracing::warn!(event = "ocr_failed", error = %e);
            OcrResult::default()
        }
    }
}
