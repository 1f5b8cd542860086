//! Structured logging setup.
//!
//! Every record is one JSON object per line on stderr. Pipeline code emits
//! events as `tracing` records carrying an `event` field (`ad_start`,
//! `ad_done`, `retry_backoff`, ...) and the run-wide context (`app`,
//! `pipeline`, `script`, `scraper_version`) is attached through the `run`
//! span; the JSON layer lists every active span on each line.

use tracing::Span;
use tracing::subscriber::set_global_default;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use crate::config::AdType;

/// Output encoding of log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to install log bridge: {0}")]
    Bridge(#[from] tracing_log::log_tracer::SetLoggerError),

    #[error("Failed to install subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the global subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), LoggingError> {
    // sqlx and sea-orm log through the `log` facade.
    tracing_log::LogTracer::init()?;

    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let base = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match format {
        LogFormat::Json => set_global_default(
            tracing_subscriber::registry().with(env).with(
                base.json()
                    .with_current_span(false)
                    .with_span_list(true)
                    .flatten_event(true),
            ),
        )?,
        LogFormat::Text => {
            set_global_default(tracing_subscriber::registry().with(env).with(base.compact()))?
        }
    }
    Ok(())
}

/// Span carrying the run-wide context fields.
pub fn run_span(ad_type: AdType, scraper_version: &str) -> Span {
    tracing::info_span!(
        "run",
        app = "gatc_scraper",
        pipeline = ad_type.as_str(),
        script = ad_type.script(),
        scraper_version = scraper_version,
    )
}

/// Span scoping the records of a single ad.
pub fn ad_span(ad_id: &str, advertiser_id: &str) -> Span {
    tracing::info_span!("ad", ad_id = ad_id, advertiser_id = advertiser_id)
}
