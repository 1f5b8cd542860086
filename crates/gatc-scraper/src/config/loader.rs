use std::path::PathBuf;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use clap::Args;
use secrecy::SecretString;

use crate::config::schema::*;
use crate::error::ConfigError;
use crate::versioning::scraper_version;

/// Command-line flags shared by the image and text pipelines.
#[derive(Debug, Clone, Args)]
pub struct ScrapeArgs {
    #[arg(long, default_value = DEFAULT_PROJECT_ID)]
    pub project_id: String,

    #[arg(long, default_value = DEFAULT_GCS_BUCKET)]
    pub gcs_bucket: String,

    /// Cloud SQL instance connection name (project:region:instance).
    #[arg(long, default_value = DEFAULT_SQL_CONN)]
    pub sql_conn: String,

    /// Connect over TCP instead of the Cloud SQL unix socket.
    #[arg(long)]
    pub db_host: Option<String>,

    #[arg(long)]
    pub db_port: Option<u16>,

    /// Full database URL (e.g. `sqlite://ads.db?mode=rwc`); overrides the DB_* settings.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long)]
    pub max_ads: Option<u64>,

    #[arg(long)]
    pub sql_limit: Option<u64>,

    /// Alias for --sql-limit.
    #[arg(long)]
    pub limit: Option<u64>,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u64,

    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    /// Shorthand for --start-date = UTC today minus N days.
    #[arg(long)]
    pub since_days: Option<u64>,

    #[arg(long, value_enum, default_value_t = OrderBy::None)]
    pub order_by: OrderBy,

    #[arg(long, num_args = 0.., value_delimiter = ',')]
    pub skip_advertisers: Vec<String>,

    /// Process a single Ad_ID.
    #[arg(long)]
    pub ad_id: Option<String>,

    /// Direct creative URL; bypasses BigQuery.
    #[arg(long)]
    pub ad_url: Option<String>,

    /// Required if --ad-url does not include the advertiser.
    #[arg(long)]
    pub advertiser_id: Option<String>,

    /// CSV or JSON Lines file of (ad_id, ad_url, advertiser_id).
    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    /// Re-run ads whose primary variant already finished.
    #[arg(long)]
    pub rescrape_done: bool,

    /// Stop after the first captured variant.
    #[arg(long)]
    pub first_variant_only: bool,

    #[arg(long, env = "PAGE_TIMEOUT_MS", default_value_t = DEFAULT_PAGE_TIMEOUT_MS)]
    pub page_timeout_ms: u64,

    #[arg(long, env = "IFRAME_TIMEOUT_MS", default_value_t = DEFAULT_IFRAME_TIMEOUT_MS)]
    pub iframe_timeout_ms: u64,

    /// Log the frame inventory of each creative page.
    #[arg(long)]
    pub debug_frames: bool,

    /// Dump creative page HTML under --debug-dir.
    #[arg(long)]
    pub debug_html: bool,

    #[arg(long, default_value = "media/debug")]
    pub debug_dir: PathBuf,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    #[arg(long, default_value_t = DEFAULT_RETRY_BASE_MS)]
    pub retry_base_ms: u64,

    /// Disable the random pause between ads.
    #[arg(long)]
    pub no_pacing: bool,

    /// Do not write to the database or object storage.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, default_value_t = 0)]
    pub shard: u32,

    #[arg(long, default_value_t = 1)]
    pub shard_count: u32,

    /// BigQuery location for query jobs (e.g. US, EU).
    #[arg(long)]
    pub bq_location: Option<String>,

    /// Write assets under this directory instead of uploading to GCS.
    #[arg(long)]
    pub local_assets_dir: Option<PathBuf>,
}

/// Connection flags accepted by the `migrate` and `metrics` commands.
#[derive(Debug, Clone, Args)]
pub struct DbArgs {
    #[arg(long, default_value = DEFAULT_SQL_CONN)]
    pub sql_conn: String,

    #[arg(long)]
    pub db_host: Option<String>,

    #[arg(long)]
    pub db_port: Option<u16>,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

impl DbArgs {
    pub fn settings(&self) -> Result<DbSettings, ConfigError> {
        DbSettings::resolve(
            self.database_url.clone(),
            self.db_host.clone(),
            self.db_port,
            &self.sql_conn,
            &env_lookup,
        )
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl DbSettings {
    /// Resolves connection settings from flags and `DB_*` variables.
    ///
    /// `DB_PASSWORD` is required unless a full database URL is supplied.
    pub fn resolve(
        database_url: Option<String>,
        host: Option<String>,
        port: Option<u16>,
        sql_conn: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let password = lookup("DB_PASSWORD").map(SecretString::from);
        if database_url.is_none() && password.is_none() {
            return Err(ConfigError::MissingEnv { name: "DB_PASSWORD" });
        }

        Ok(Self {
            database_url,
            name: lookup("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            user: lookup("DB_USER").unwrap_or_else(|| DEFAULT_DB_USER.to_string()),
            password,
            host: host.filter(|h| !h.is_empty()),
            port: port.unwrap_or(DEFAULT_DB_PORT),
            sslmode: lookup("DB_SSLMODE").unwrap_or_else(|| DEFAULT_DB_SSLMODE.to_string()),
            sql_conn: sql_conn.to_string(),
            connect_timeout: Duration::from_secs(10),
        })
    }
}

/// Builds the run configuration from parsed flags and the process environment.
pub fn load_scrape_config(args: &ScrapeArgs, ad_type: AdType) -> Result<ScrapeConfig, ConfigError> {
    build_scrape_config(args, ad_type, Utc::now().date_naive(), &env_lookup)
}

/// Environment-independent core of [`load_scrape_config`].
pub fn build_scrape_config(
    args: &ScrapeArgs,
    ad_type: AdType,
    today: NaiveDate,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<ScrapeConfig, ConfigError> {
    let start_date = match args.since_days {
        Some(days) => Some(today.checked_sub_days(Days::new(days)).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "since_days",
                reason: format!("{} days before {} is out of range", days, today),
            }
        })?),
        None => args.start_date,
    };

    let (shard, shard_count) = cloud_run_shard(args.shard, args.shard_count, lookup)?;

    let selection = Selection {
        start_date,
        end_date: args.end_date,
        order_by: args.order_by,
        sql_limit: args.sql_limit.or(args.limit),
        max_ads: args.max_ads,
        batch_size: args.batch_size,
        skip_advertisers: args
            .skip_advertisers
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        ad_id: args.ad_id.clone().filter(|s| !s.is_empty()),
        ad_url: args.ad_url.clone().filter(|s| !s.is_empty()),
        advertiser_id: args.advertiser_id.clone().filter(|s| !s.is_empty()),
        manifest_path: args.manifest_path.clone(),
        rescrape_done: args.rescrape_done,
        shard,
        shard_count,
    };

    let db = DbSettings::resolve(
        args.database_url.clone(),
        args.db_host.clone(),
        args.db_port,
        &args.sql_conn,
        lookup,
    )?;

    let retry = RetryPolicy {
        max_retries: args.max_retries,
        base: Duration::from_millis(args.retry_base_ms),
        jitter: match ad_type {
            AdType::Text => Duration::from_millis(300),
            AdType::Image => Duration::ZERO,
        },
        pacing: match ad_type {
            AdType::Text if !args.no_pacing => {
                Some((Duration::from_secs(1), Duration::from_secs(3)))
            }
            _ => None,
        },
    };

    let config = ScrapeConfig {
        ad_type,
        project_id: args.project_id.clone(),
        gcs_bucket: args.gcs_bucket.clone(),
        bq_location: args.bq_location.clone(),
        concurrency: args.concurrency,
        dry_run: args.dry_run,
        scraper_version: scraper_version(ad_type.script(), lookup),
        db,
        selection,
        capture: CaptureSettings {
            user_agent: args.user_agent.clone(),
            all_variants: !args.first_variant_only,
            page_timeout: Duration::from_millis(args.page_timeout_ms),
            iframe_timeout: Duration::from_millis(args.iframe_timeout_ms),
            debug_frames: args.debug_frames,
            debug_html: args.debug_html,
            debug_dir: args.debug_dir.clone(),
        },
        retry,
        sink: match &args.local_assets_dir {
            Some(dir) => AssetSink::Local(dir.clone()),
            None => AssetSink::Gcs,
        },
    };

    validate_config(&config)?;
    Ok(config)
}

/// Cloud Run task variables replace the shard flags when those were left at
/// their defaults.
fn cloud_run_shard(
    shard: u32,
    shard_count: u32,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<(u32, u32), ConfigError> {
    if shard != 0 || shard_count != 1 {
        return Ok((shard, shard_count));
    }
    let (Some(index), Some(count)) = (
        lookup("CLOUD_RUN_TASK_INDEX"),
        lookup("CLOUD_RUN_TASK_COUNT"),
    ) else {
        return Ok((shard, shard_count));
    };

    let parse = |field: &'static str, v: String| {
        v.trim().parse::<u32>().map_err(|e| ConfigError::InvalidValue {
            field,
            reason: format!("'{}': {}", v, e),
        })
    };
    Ok((
        parse("CLOUD_RUN_TASK_INDEX", index)?,
        parse("CLOUD_RUN_TASK_COUNT", count)?,
    ))
}

fn validate_config(config: &ScrapeConfig) -> Result<(), ConfigError> {
    let sel = &config.selection;

    if let (Some(start), Some(end)) = (sel.start_date, sel.end_date) {
        if start > end {
            return Err(ConfigError::Validation {
                message: format!("start_date ({}) is after end_date ({})", start, end),
            });
        }
    }

    if sel.shard_count == 0 || sel.shard >= sel.shard_count {
        return Err(ConfigError::Validation {
            message: format!(
                "shard {} is out of range for shard_count {}",
                sel.shard, sel.shard_count
            ),
        });
    }

    if config.concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "concurrency must be > 0".to_string(),
        });
    }

    if sel.batch_size == 0 {
        return Err(ConfigError::Validation {
            message: "batch_size must be > 0".to_string(),
        });
    }

    if sel.is_direct() {
        return Ok(());
    }

    let unbounded = !sel.has_date_filter() && !sel.has_limit();
    if unbounded {
        tracing::warn!(
            event = "potential_large_scan",
            message = "No date filter or limit supplied; this may scan the full BigQuery table. \
                       Consider --since-days, --start-date/--end-date, or --sql-limit."
        );
        if sel.shard_count > 1 {
            tracing::warn!(
                event = "sharded_full_scan",
                shard = sel.shard,
                shard_count = sel.shard_count,
                message = "Sharding is enabled but no date/limit provided; each shard will read \
                           the full dataset."
            );
        }
    }

    Ok(())
}
