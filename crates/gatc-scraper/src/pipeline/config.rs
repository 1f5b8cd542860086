use crate::config::{AdType, RetryPolicy, ScrapeConfig, Selection};

/// The parts of [`ScrapeConfig`] the pipeline reads while running.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ad_type: AdType,
    pub gcs_bucket: String,
    pub scraper_version: String,
    pub concurrency: usize,
    pub dry_run: bool,
    pub selection: Selection,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self {
            ad_type: config.ad_type,
            gcs_bucket: config.gcs_bucket.clone(),
            scraper_version: config.scraper_version.clone(),
            concurrency: config.concurrency,
            dry_run: config.dry_run,
            selection: config.selection.clone(),
            retry: config.retry.clone(),
        }
    }
}
