use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chrono::{Days, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::Instrument;

use gatc_scraper::auth::TokenProvider;
use gatc_scraper::capture::HttpRenderer;
use gatc_scraper::config::{load_scrape_config, AdType, AssetSink, DbArgs, ScrapeArgs};
use gatc_scraper::logging::{init_logging, run_span, LogFormat};
use gatc_scraper::ocr::OcrProcessor;
use gatc_scraper::pipeline::{self, PipelineConfig, PipelineContext, MONITOR_INTERVAL};
use gatc_scraper::source::BigQueryCatalog;
use gatc_scraper::storage::{GcsObjectStore, LocalObjectStore, ObjectStore};
use gatc_scraper::{db, metrics, Recorder, ScraperError};

const EXIT_CONFIG: u8 = 10;
const EXIT_RUNTIME: u8 = 20;
const EXIT_IO: u8 = 30;
const EXIT_NETWORK: u8 = 40;

#[derive(Parser, Debug)]
#[command(name = "gatc-scraper", version, about = "Scrape political ad creatives from the Google Ads Transparency Center")]
struct Cli {
    /// Log level, overridden by RUST_LOG.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture IMAGE creatives.
    Image(ScrapeArgs),
    /// Capture TEXT creatives.
    Text(ScrapeArgs),
    /// Apply database migrations and exit.
    Migrate(DbArgs),
    /// Print the reporting views.
    Metrics(MetricsArgs),
}

#[derive(Args, Debug)]
struct MetricsArgs {
    #[command(flatten)]
    db: DbArgs,

    /// Days of daily throughput to show.
    #[arg(long, default_value_t = 14)]
    days: u64,

    /// Rows in the top errors section.
    #[arg(long, default_value_t = metrics::DEFAULT_ERROR_LIMIT)]
    error_limit: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.log_format) {
        eprintln!("failed to initialize logging: {}", e);
        return ExitCode::from(EXIT_RUNTIME);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(event = "runtime_error", error = %e);
            return ExitCode::from(EXIT_RUNTIME);
        }
    };

    match runtime.block_on(dispatch(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(event = "fatal", error = %format!("{:#}", e));
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn dispatch(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Image(args) => scrape(args, AdType::Image).await,
        Command::Text(args) => scrape(args, AdType::Text).await,
        Command::Migrate(args) => {
            let settings = args.settings()?;
            db::open(&settings).await?;
            Ok(())
        }
        Command::Metrics(args) => {
            let settings = args.db.settings()?;
            let conn = db::open(&settings).await?;
            let since = Utc::now()
                .date_naive()
                .checked_sub_days(Days::new(args.days))
                .context("--days is out of range")?;
            print!("{}", metrics::render_report(&conn, since, args.error_limit).await);
            Ok(())
        }
    }
}

async fn scrape(args: ScrapeArgs, ad_type: AdType) -> anyhow::Result<()> {
    let config = load_scrape_config(&args, ad_type)?;
    let span = run_span(config.ad_type, &config.scraper_version);

    async move {
        let conn = db::open(&config.db).await?;
        let http = reqwest::Client::builder()
            .user_agent(config.capture.user_agent.clone())
            .build()
            .context("building HTTP client")?;
        let tokens = Arc::new(TokenProvider::new(http.clone()));

        let store: Arc<dyn ObjectStore> = match &config.sink {
            AssetSink::Gcs => Arc::new(GcsObjectStore::new(
                config.gcs_bucket.clone(),
                http.clone(),
                Arc::clone(&tokens),
            )),
            AssetSink::Local(dir) => Arc::new(LocalObjectStore::new(dir, config.gcs_bucket.clone())),
        };

        let ctx = PipelineContext {
            config: Arc::new(PipelineConfig::from_config(&config)),
            recorder: Recorder::new(conn, config.dry_run),
            store,
            catalog: Arc::new(BigQueryCatalog::new(
                config.project_id.clone(),
                config.bq_location.clone(),
                http.clone(),
                Arc::clone(&tokens),
            )),
            renderer: Arc::new(HttpRenderer::with_client(http, config.capture.clone())),
            ocr: OcrProcessor::from_env(),
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            if !flag.swap(true, Ordering::Relaxed) {
                tracing::warn!(event = "shutdown_requested");
            }
        })
        .context("installing Ctrl-C handler")?;

        pipeline::run(ctx, shutdown, MONITOR_INTERVAL).await?;
        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}

fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ScraperError>() {
            return match e {
                ScraperError::Config(_) => EXIT_CONFIG,
                ScraperError::Storage(_) => EXIT_IO,
                ScraperError::Auth(_) | ScraperError::Source(_) => EXIT_NETWORK,
                _ => EXIT_RUNTIME,
            };
        }
        if cause.is::<gatc_scraper::ConfigError>() {
            return EXIT_CONFIG;
        }
        if cause.is::<std::io::Error>() {
            return EXIT_IO;
        }
        if cause.is::<reqwest::Error>() {
            return EXIT_NETWORK;
        }
    }
    EXIT_RUNTIME
}
