//! Where creatives to scrape come from: a manifest file, a single URL or
//! id, or a streaming query over the public political ads dataset.

pub mod bigquery;
pub mod manifest;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::{AdType, OrderBy};
use crate::error::SourceError;
use crate::urls::parse_ids_from_url;

pub use bigquery::BigQueryCatalog;
pub use manifest::read_manifest;

/// One creative to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdTarget {
    pub ad_id: String,
    pub ad_url: String,
    pub advertiser_id: String,
}

impl AdTarget {
    pub fn new(
        ad_id: impl Into<String>,
        ad_url: impl Into<String>,
        advertiser_id: impl Into<String>,
    ) -> Self {
        Self {
            ad_id: ad_id.into(),
            ad_url: ad_url.into(),
            advertiser_id: advertiser_id.into(),
        }
    }
}

/// Filters of a streaming catalog query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamQuery {
    pub ad_type: AdType,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub order_by: OrderBy,
    pub sql_limit: Option<u64>,
    pub page_size: u64,
}

/// Rows per page: the batch size, capped by the SQL limit, never zero.
pub fn stream_page_size(batch_size: u64, sql_limit: Option<u64>) -> u64 {
    match sql_limit {
        Some(limit) => batch_size.min(limit).max(1),
        None => batch_size.max(1),
    }
}

/// Page-at-a-time access to a running catalog query.
#[async_trait]
pub trait TargetPages: Send {
    /// Next page of targets, or `None` when the result set is exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<AdTarget>>, SourceError>;
}

/// Catalog of creatives.
#[async_trait]
pub trait AdCatalog: Send + Sync {
    /// Looks up one creative of `ad_type` by id.
    async fn find_ad(&self, ad_type: AdType, ad_id: &str) -> Result<Option<AdTarget>, SourceError>;

    /// Starts a streaming query.
    async fn stream(&self, query: &StreamQuery) -> Result<Box<dyn TargetPages>, SourceError>;
}

/// Resolves `--ad-url`, filling ids from the URL unless given explicitly.
pub fn resolve_direct_target(
    ad_url: &str,
    ad_id: Option<&str>,
    advertiser_id: Option<&str>,
) -> Result<AdTarget, SourceError> {
    let parsed = parse_ids_from_url(ad_url);
    let ad = ad_id
        .map(str::to_string)
        .or_else(|| parsed.as_ref().map(|(_, ad)| ad.clone()));
    let advertiser = advertiser_id
        .map(str::to_string)
        .or_else(|| parsed.as_ref().map(|(adv, _)| adv.clone()));

    match (ad, advertiser) {
        (Some(ad), Some(advertiser)) if !ad.is_empty() && !advertiser.is_empty() => {
            Ok(AdTarget::new(ad, ad_url, advertiser))
        }
        _ => Err(SourceError::UnresolvedTarget(ad_url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://adstransparency.google.com/advertiser/AR123/creative/CR456?region=US";

    #[test]
    fn test_resolve_from_url() {
        let target = resolve_direct_target(URL, None, None).unwrap();
        assert_eq!(target, AdTarget::new("CR456", URL, "AR123"));
    }

    #[test]
    fn test_explicit_ids_win() {
        let target = resolve_direct_target(URL, Some("CR9"), Some("AR9")).unwrap();
        assert_eq!(target.ad_id, "CR9");
        assert_eq!(target.advertiser_id, "AR9");
    }

    #[test]
    fn test_unresolved_without_ids() {
        let url = "https://example.com/creative";
        assert!(matches!(
            resolve_direct_target(url, Some("CR1"), None),
            Err(SourceError::UnresolvedTarget(_))
        ));
        assert!(resolve_direct_target(url, Some("CR1"), Some("AR1")).is_ok());
    }

    #[test]
    fn test_page_size() {
        assert_eq!(stream_page_size(5000, None), 5000);
        assert_eq!(stream_page_size(5000, Some(20)), 20);
        assert_eq!(stream_page_size(10, Some(20)), 10);
        assert_eq!(stream_page_size(5000, Some(0)), 1);
    }
}
