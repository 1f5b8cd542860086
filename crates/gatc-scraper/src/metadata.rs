//! Object metadata attached to every uploaded asset.

use serde::Serialize;

use crate::config::AdType;

/// Capture facts recorded alongside an asset in object storage.
#[derive(Debug, Clone, Serialize)]
pub struct AssetMetadata {
    pub ad_type: AdType,
    pub ad_id: String,
    pub advertiser_id: String,
    pub variant_id: String,
    pub render_method: String,
    pub capture_method: String,
    pub capture_target: String,
    pub width: u32,
    pub height: u32,
    pub sha256: String,
    pub phash: String,
    pub scraper_version: String,
    pub click_url: Option<String>,
    pub source_url: Option<String>,
}

impl AssetMetadata {
    /// Key/value pairs in their fixed audit order. Optional URLs are omitted
    /// when absent or empty.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut md = vec![
            ("ad_type", self.ad_type.as_str().to_string()),
            ("ad_id", self.ad_id.clone()),
            ("advertiser_id", self.advertiser_id.clone()),
            ("variant_id", self.variant_id.clone()),
            ("render_method", self.render_method.clone()),
            ("capture_method", self.capture_method.clone()),
            ("capture_target", self.capture_target.clone()),
            ("width", self.width.to_string()),
            ("height", self.height.to_string()),
            ("sha256", self.sha256.clone()),
            ("phash", self.phash.clone()),
            ("scraper_version", self.scraper_version.clone()),
        ];
        if let Some(url) = self.click_url.as_deref().filter(|u| !u.is_empty()) {
            md.push(("click_url", url.to_string()));
        }
        if let Some(url) = self.source_url.as_deref().filter(|u| !u.is_empty()) {
            md.push(("source_url", url.to_string()));
        }
        md
    }

    /// Metadata as a JSON object for the storage API.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .to_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
            .collect();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AssetMetadata {
        AssetMetadata {
            ad_type: AdType::Image,
            ad_id: "CR1".into(),
            advertiser_id: "AR1".into(),
            variant_id: "v1".into(),
            render_method: "sadbundle".into(),
            capture_method: "img".into(),
            capture_target: "frame:0".into(),
            width: 300,
            height: 250,
            sha256: "a".repeat(64),
            phash: "0f0f0f0f0f0f0f0f".into(),
            scraper_version: "image:2025-10-26.1".into(),
            click_url: None,
            source_url: None,
        }
    }

    #[test]
    fn test_pairs_order_without_urls() {
        let keys: Vec<&str> = sample().to_pairs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "ad_type",
                "ad_id",
                "advertiser_id",
                "variant_id",
                "render_method",
                "capture_method",
                "capture_target",
                "width",
                "height",
                "sha256",
                "phash",
                "scraper_version",
            ]
        );
    }

    #[test]
    fn test_click_url_precedes_source_url() {
        let mut md = sample();
        md.source_url = Some("https://adstransparency.google.com/x".into());
        md.click_url = Some("https://example.com".into());
        let pairs = md.to_pairs();
        let tail: Vec<&str> = pairs[pairs.len() - 2..].iter().map(|(k, _)| *k).collect();
        assert_eq!(tail, vec!["click_url", "source_url"]);
        assert_eq!(pairs[0].1, "IMAGE");
        assert_eq!(pairs[7].1, "300");
    }

    #[test]
    fn test_empty_click_url_omitted() {
        let mut md = sample();
        md.click_url = Some(String::new());
        assert!(md.to_pairs().iter().all(|(k, _)| *k != "click_url"));
    }
}
