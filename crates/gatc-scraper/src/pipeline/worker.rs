use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::config::{RetryPolicy, PRIMARY_VARIANT_ID};
use crate::db::ad_repo::AdRef;
use crate::source::AdTarget;

use super::context::PipelineContext;
use super::processor::{process_ad, AdOutcome};
use super::runner::RunSummary;

/// Renderer restarts allowed per ad before the attempt counts as an error.
const MAX_RESTARTS: u32 = 3;

/// Uniform random value in `[0, 1)`; `0.0` if the OS source fails.
pub fn random_fraction() -> f64 {
    let mut buf = [0u8; 8];
    if getrandom::fill(&mut buf).is_err() {
        return 0.0;
    }
    (u64::from_le_bytes(buf) >> 11) as f64 / (1u64 << 53) as f64
}

/// Uniform duration in `[min, max)`.
pub fn uniform(min: Duration, max: Duration) -> Duration {
    min + max.saturating_sub(min).mul_f64(random_fraction())
}

/// `base * 2^attempt`, plus up to `policy.jitter` of random delay.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = policy.base.saturating_mul(1u32 << attempt.min(16));
    if policy.jitter.is_zero() {
        exp
    } else {
        exp + policy.jitter.mul_f64(random_fraction())
    }
}

/// Runs one ad with bounded retries. Done and terminal outcomes end the
/// loop, as does the retry budget or a shutdown request.
pub async fn process_with_retry(
    ctx: &PipelineContext,
    target: &AdTarget,
    shutdown: &AtomicBool,
) -> AdOutcome {
    let policy = &ctx.config.retry;
    let mut attempt = 0u32;
    let mut restarts = 0u32;

    loop {
        let outcome = process_ad(ctx, target).await;
        match outcome {
            AdOutcome::Done { .. } | AdOutcome::Terminal(_) => return outcome,
            AdOutcome::Restart(ref reason) if restarts < MAX_RESTARTS => {
                restarts += 1;
                tracing::warn!(
                    event = "renderer_restarted",
                    ad_id = %target.ad_id,
                    restarts = restarts,
                    reason = %reason,
                );
                continue;
            }
            AdOutcome::Restart(reason) => return restarts_exhausted(ctx, target, &reason).await,
            AdOutcome::Error(_) => {
                if attempt >= policy.max_retries || shutdown.load(Ordering::Relaxed) {
                    return outcome;
                }
                let delay = backoff_delay(policy, attempt);
                tracing::info!(
                    event = "retry_backoff",
                    ad_id = %target.ad_id,
                    attempt = attempt + 1,
                    delay_s = (delay.as_secs_f64() * 1000.0).round() / 1000.0,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Records an ad whose renderer kept failing as an error, so later runs
/// pick it up again like any other failure.
async fn restarts_exhausted(ctx: &PipelineContext, target: &AdTarget, reason: &str) -> AdOutcome {
    let message = format!("exception: {}", reason);
    let primary = AdRef {
        ad_id: &target.ad_id,
        variant_id: PRIMARY_VARIANT_ID,
        advertiser_id: &target.advertiser_id,
    };
    tracing::warn!(
        event = "renderer_restarts_exhausted",
        ad_id = %target.ad_id,
        restarts = MAX_RESTARTS,
    );
    if let Err(e) = ctx.recorder.record_error(primary, &message).await {
        tracing::error!(event = "record_error_failed", error = %e);
    }
    AdOutcome::Error(message)
}

/// Pulls targets off the shared queue until it closes or shutdown is set.
pub async fn run_worker(
    worker_id: usize,
    ctx: PipelineContext,
    queue: Arc<Mutex<mpsc::Receiver<AdTarget>>>,
    shutdown: Arc<AtomicBool>,
) -> RunSummary {
    tracing::debug!(event = "worker_start", worker_id = worker_id);
    let mut tally = RunSummary::default();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::debug!(event = "worker_shutdown", worker_id = worker_id);
            break;
        }

        let next = { queue.lock().await.recv().await };
        let Some(target) = next else {
            break;
        };

        let outcome = process_with_retry(&ctx, &target, &shutdown).await;
        tally.record(&outcome);

        if let Some((min, max)) = ctx.config.retry.pacing {
            tokio::time::sleep(uniform(min, max)).await;
        }
    }

    tracing::debug!(event = "worker_stop", worker_id = worker_id);
    tally
}
