//! Scraper version stamping.
//!
//! Every row written by a run carries a `scraper_version`. Deployments pin it
//! through `AD_SCRAPER_VERSION`; otherwise it is derived from the pipeline
//! name and the release date of its capture logic.

/// Release tag of the capture logic shared by both pipelines.
pub const SCRIPT_VERSION: &str = "2025-10-26.1";

/// Environment override for the stamped version.
pub const VERSION_ENV: &str = "AD_SCRAPER_VERSION";

/// Returns the version stamp for `script` (`"image"` or `"text"`), reading
/// the override through `lookup`.
pub fn scraper_version(script: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    match lookup(VERSION_ENV) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => format!("{}:{}", script, SCRIPT_VERSION),
    }
}
