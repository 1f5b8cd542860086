use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROJECT_ID: &str = "your-gcp-project";
pub const DEFAULT_GCS_BUCKET: &str = "your-scraper-bucket";
pub const DEFAULT_SQL_CONN: &str = "your-project:your-region:your-instance";
pub const DEFAULT_USER_AGENT: &str = "yale-researcher/1.0";
pub const DEFAULT_CONCURRENCY: usize = 2;
pub const DEFAULT_BATCH_SIZE: u64 = 5000;
pub const DEFAULT_PAGE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_IFRAME_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BASE_MS: u64 = 500;
pub const DEFAULT_DB_NAME: &str = "adsdb";
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_SSLMODE: &str = "prefer";

/// Variant identifier of the primary capture of every creative.
pub const PRIMARY_VARIANT_ID: &str = "v1";

/// Creative format handled by a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdType {
    Image,
    Text,
}

impl AdType {
    /// Value stored in `ads.ad_type` and BigQuery's `Ad_Type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdType::Image => "IMAGE",
            AdType::Text => "TEXT",
        }
    }

    /// Pipeline name, also the asset path segment.
    pub fn script(&self) -> &'static str {
        match self {
            AdType::Image => "image",
            AdType::Text => "text",
        }
    }
}

impl std::fmt::Display for AdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering applied to the BigQuery stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    None,
    DateAsc,
    DateDesc,
    Advertiser,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::None => "none",
            OrderBy::DateAsc => "date_asc",
            OrderBy::DateDesc => "date_desc",
            OrderBy::Advertiser => "advertiser",
        }
    }
}

/// Postgres connection settings.
#[derive(Debug)]
pub struct DbSettings {
    /// Full connection URL; takes precedence over every other field.
    pub database_url: Option<String>,
    pub name: String,
    pub user: String,
    pub password: Option<SecretString>,
    pub host: Option<String>,
    pub port: u16,
    pub sslmode: String,
    /// Cloud SQL instance connection name, used for the unix socket.
    pub sql_conn: String,
    pub connect_timeout: Duration,
}

/// Which rows to scrape.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub order_by: OrderBy,
    pub sql_limit: Option<u64>,
    pub max_ads: Option<u64>,
    pub batch_size: u64,
    pub skip_advertisers: HashSet<String>,
    pub ad_id: Option<String>,
    pub ad_url: Option<String>,
    pub advertiser_id: Option<String>,
    pub manifest_path: Option<PathBuf>,
    pub rescrape_done: bool,
    pub shard: u32,
    pub shard_count: u32,
}

impl Selection {
    /// True when a single creative or a manifest was requested.
    pub fn is_direct(&self) -> bool {
        self.ad_url.is_some() || self.ad_id.is_some() || self.manifest_path.is_some()
    }

    pub fn has_date_filter(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    pub fn has_limit(&self) -> bool {
        self.sql_limit.is_some() || self.max_ads.is_some()
    }

    /// Whether `ad_id` belongs to this run's shard.
    pub fn in_shard(&self, ad_id: &str) -> bool {
        self.shard_count <= 1
            || crate::hashing::stable_int_hash(ad_id) % self.shard_count == self.shard
    }
}

/// Capture behaviour of the renderer.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub user_agent: String,
    pub all_variants: bool,
    pub page_timeout: Duration,
    pub iframe_timeout: Duration,
    pub debug_frames: bool,
    pub debug_html: bool,
    pub debug_dir: PathBuf,
}

/// Per-ad retry behaviour.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub jitter: Duration,
    /// Random pause between consecutive ads, as `(min, max)`.
    pub pacing: Option<(Duration, Duration)>,
}

/// Where assets are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSink {
    Gcs,
    /// Mirror of the bucket layout under a local directory.
    Local(PathBuf),
}

/// Fully resolved settings of one pipeline run.
#[derive(Debug)]
pub struct ScrapeConfig {
    pub ad_type: AdType,
    pub project_id: String,
    pub gcs_bucket: String,
    pub bq_location: Option<String>,
    pub concurrency: usize,
    pub dry_run: bool,
    pub scraper_version: String,
    pub db: DbSettings,
    pub selection: Selection,
    pub capture: CaptureSettings,
    pub retry: RetryPolicy,
    pub sink: AssetSink,
}
