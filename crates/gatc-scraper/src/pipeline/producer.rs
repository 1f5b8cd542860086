//! Feeds targets into the work queue.
//!
//! Sources are tried in a fixed order: manifest, direct URL, single ad id,
//! then the streaming catalog query. Only the first one configured runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::PRIMARY_VARIANT_ID;
use crate::db::AdStatus;
use crate::error::ScraperError;
use crate::source::{read_manifest, resolve_direct_target, stream_page_size, AdTarget, StreamQuery};

use super::context::PipelineContext;

/// How often a producer blocked on a full queue checks for shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Advertiser and shard filters shared by every source.
fn is_selected(ctx: &PipelineContext, target: &AdTarget) -> bool {
    let sel = &ctx.config.selection;
    !sel.skip_advertisers.contains(&target.advertiser_id) && sel.in_shard(&target.ad_id)
}

struct Enqueuer<'a> {
    tx: mpsc::Sender<AdTarget>,
    shutdown: &'a AtomicBool,
    max_ads: Option<u64>,
    enqueued: u64,
}

impl Enqueuer<'_> {
    fn done(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
            || self.max_ads.is_some_and(|max| self.enqueued >= max)
    }

    /// Waits for queue space. Returns `false` once no worker is left to
    /// receive or shutdown was requested while waiting.
    async fn send(&mut self, target: AdTarget) -> bool {
        loop {
            tokio::select! {
                permit = self.tx.reserve() => {
                    let Ok(permit) = permit else {
                        tracing::warn!(event = "queue_closed");
                        return false;
                    };
                    permit.send(target);
                    self.enqueued += 1;
                    return true;
                }
                _ = tokio::time::sleep(SHUTDOWN_POLL) => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        tracing::info!(event = "enqueue_interrupted", enqueued = self.enqueued);
                        return false;
                    }
                }
            }
        }
    }
}

/// Enqueues every selected target and returns how many were sent.
/// Dropping `tx` on return lets the workers drain and exit.
pub async fn produce(
    ctx: &PipelineContext,
    tx: mpsc::Sender<AdTarget>,
    shutdown: &AtomicBool,
) -> Result<u64, ScraperError> {
    let sel = &ctx.config.selection;
    let mut out = Enqueuer {
        tx,
        shutdown,
        max_ads: sel.max_ads,
        enqueued: 0,
    };

    if let Some(path) = &sel.manifest_path {
        let targets = read_manifest(path)?;
        tracing::info!(
            event = "manifest_stream_start",
            path = %path.display(),
            rows = targets.len(),
        );
        for target in targets {
            if out.done() {
                break;
            }
            if !is_selected(ctx, &target) {
                continue;
            }
            if !out.send(target).await {
                break;
            }
        }
        return Ok(out.enqueued);
    }

    if let Some(url) = &sel.ad_url {
        let target =
            resolve_direct_target(url, sel.ad_id.as_deref(), sel.advertiser_id.as_deref())?;
        if !sel.in_shard(&target.ad_id) {
            tracing::info!(event = "shard_skip", ad_id = %target.ad_id, shard = sel.shard);
            return Ok(0);
        }
        tracing::info!(
            event = "enqueue_direct_url",
            ad_id = %target.ad_id,
            advertiser_id = %target.advertiser_id,
            ad_url = %target.ad_url,
        );
        out.send(target).await;
        return Ok(out.enqueued);
    }

    if let Some(ad_id) = &sel.ad_id {
        let Some(target) = ctx.catalog.find_ad(ctx.config.ad_type, ad_id).await? else {
            tracing::warn!(event = "ad_not_found", ad_id = %ad_id);
            return Ok(0);
        };
        if !is_selected(ctx, &target) {
            tracing::info!(
                event = "shard_skip",
                ad_id = %target.ad_id,
                advertiser_id = %target.advertiser_id,
                shard = sel.shard,
            );
            return Ok(0);
        }
        tracing::info!(
            event = "enqueue_single_ad",
            ad_id = %target.ad_id,
            advertiser_id = %target.advertiser_id,
        );
        out.send(target).await;
        return Ok(out.enqueued);
    }

    let query = StreamQuery {
        ad_type: ctx.config.ad_type,
        start_date: sel.start_date,
        end_date: sel.end_date,
        order_by: sel.order_by,
        sql_limit: sel.sql_limit,
        page_size: stream_page_size(sel.batch_size, sel.sql_limit),
    };
    tracing::info!(
        event = "enqueue_streaming_start",
        start_date = ?sel.start_date,
        end_date = ?sel.end_date,
        order_by = sel.order_by.as_str(),
        sql_limit = sel.sql_limit,
        max_ads = sel.max_ads,
        page_size = query.page_size,
        shard = sel.shard,
        shard_count = sel.shard_count,
    );

    let mut pages = ctx.catalog.stream(&query).await?;
    let mut skipped = 0u64;
    'pages: while let Some(page) = pages.next_page().await? {
        for target in page {
            if out.done() {
                break 'pages;
            }
            if !is_selected(ctx, &target) {
                skipped += 1;
                continue;
            }
            if !sel.rescrape_done {
                let status = ctx
                    .recorder
                    .status_of(&target.ad_id, PRIMARY_VARIANT_ID)
                    .await?;
                if let Some(status) = status.filter(|s| !AdStatus::is_retryable(s)) {
                    tracing::debug!(
                        event = "skip_existing_success",
                        ad_id = %target.ad_id,
                        status = %status,
                    );
                    skipped += 1;
                    continue;
                }
            }
            if !out.send(target).await {
                break 'pages;
            }
        }
    }

    tracing::info!(event = "enqueue_complete", enqueued = out.enqueued, skipped = skipped);
    Ok(out.enqueued)
}
