use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;

use crate::error::ScraperError;
use crate::source::AdTarget;

use super::context::PipelineContext;
use super::monitor::run_monitor;
use super::processor::AdOutcome;
use super::producer::produce;
use super::worker::run_worker;

/// Totals of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub enqueued: u64,
    pub done: u64,
    pub terminal: u64,
    pub errors: u64,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &AdOutcome) {
        match outcome {
            AdOutcome::Done { .. } => self.done += 1,
            AdOutcome::Terminal(_) => self.terminal += 1,
            AdOutcome::Error(_) | AdOutcome::Restart(_) => self.errors += 1,
        }
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.enqueued += other.enqueued;
        self.done += other.done;
        self.terminal += other.terminal;
        self.errors += other.errors;
    }
}

/// Runs the producer, `concurrency` workers and the progress monitor until
/// every enqueued ad is processed.
///
/// Setting `shutdown` stops the producer and lets each worker finish its
/// current ad. A producer failure is returned after the workers drain.
pub async fn run(
    ctx: PipelineContext,
    shutdown: Arc<AtomicBool>,
    monitor_every: Duration,
) -> Result<RunSummary, ScraperError> {
    let concurrency = ctx.config.concurrency.max(1);
    let (tx, rx) = mpsc::channel::<AdTarget>(concurrency * 2);
    let queue = Arc::new(Mutex::new(rx));

    tracing::info!(
        event = "run_start",
        concurrency = concurrency,
        dry_run = ctx.config.dry_run,
    );

    let mut workers = JoinSet::new();
    for worker_id in 0..concurrency {
        workers.spawn(run_worker(
            worker_id,
            ctx.clone(),
            Arc::clone(&queue),
            Arc::clone(&shutdown),
        ));
    }
    // Workers own the receiver; once they all stop, a blocked send fails.
    drop(queue);

    let (stop_tx, stop_rx) = oneshot::channel();
    let monitor = tokio::spawn(run_monitor(
        ctx.recorder.connection().clone(),
        monitor_every,
        stop_rx,
    ));

    let produced = produce(&ctx, tx, &shutdown).await;
    if let Err(e) = &produced {
        tracing::error!(event = "producer_error", error = %e);
    }

    let mut summary = RunSummary::default();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(tally) => summary.merge(tally),
            Err(e) => tracing::error!(event = "worker_panicked", error = %e),
        }
    }

    let _ = stop_tx.send(());
    if let Err(e) = monitor.await {
        tracing::warn!(event = "monitor_join_error", error = %e);
    }

    summary.enqueued = produced?;
    tracing::info!(
        event = "run_complete",
        enqueued = summary.enqueued,
        done = summary.done,
        terminal = summary.terminal,
        errors = summary.errors,
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TerminalStatus;

    #[test]
    fn test_summary_tally() {
        let mut a = RunSummary::default();
        a.record(&AdOutcome::Done { variants: 2 });
        a.record(&AdOutcome::Terminal(TerminalStatus::NotFound));
        a.record(&AdOutcome::Error("boom".into()));

        let mut b = RunSummary::default();
        b.record(&AdOutcome::Done { variants: 1 });
        b.merge(a);

        assert_eq!(
            b,
            RunSummary {
                enqueued: 0,
                done: 2,
                terminal: 1,
                errors: 1
            }
        );
    }
}
