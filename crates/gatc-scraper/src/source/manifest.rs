//! Manifest files listing creatives to scrape.
//!
//! Two layouts are accepted:
//! * JSON Lines, one object per line with `ad_id`, `ad_url`, `advertiser_id`
//!   (camelCase keys also accepted);
//! * CSV with a header row naming the same columns (`Ad_ID` style headers
//!   also accepted).
//!
//! JSON Lines is chosen when the first non-blank line starts with `{` or
//! the file ends in `.json`/`.jsonl`.

use std::mem::take;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::AdTarget;
use crate::error::SourceError;

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(default, alias = "adId")]
    ad_id: Option<String>,
    #[serde(default, alias = "adUrl")]
    ad_url: Option<String>,
    #[serde(default, alias = "advertiserId")]
    advertiser_id: Option<String>,
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Reads every target listed in a manifest file.
pub fn read_manifest(path: &Path) -> Result<Vec<AdTarget>, SourceError> {
    let resolved = expand_home(path);
    let text = std::fs::read_to_string(&resolved).map_err(|e| SourceError::ReadManifest {
        path: resolved.clone(),
        source: e,
    })?;

    let Some(first_line) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(Vec::new());
    };

    let json_ext = matches!(
        resolved.extension().and_then(|e| e.to_str()),
        Some("json" | "jsonl")
    );
    if first_line.starts_with('{') || json_ext {
        parse_jsonl(&text)
    } else {
        parse_csv(&text)
    }
}

fn complete(
    line: usize,
    ad_id: Option<String>,
    ad_url: Option<String>,
    advertiser_id: Option<String>,
) -> Result<AdTarget, SourceError> {
    let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    match (clean(ad_id), clean(ad_url), clean(advertiser_id)) {
        (Some(ad), Some(url), Some(adv)) => Ok(AdTarget::new(ad, url, adv)),
        _ => Err(SourceError::InvalidManifestRow {
            line,
            reason: "missing ad_id/ad_url/advertiser_id".to_string(),
        }),
    }
}

pub fn parse_jsonl(text: &str) -> Result<Vec<AdTarget>, SourceError> {
    let mut targets = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let entry: ManifestEntry =
            serde_json::from_str(raw).map_err(|e| SourceError::InvalidManifestRow {
                line: idx + 1,
                reason: e.to_string(),
            })?;
        targets.push(complete(idx + 1, entry.ad_id, entry.ad_url, entry.advertiser_id)?);
    }
    Ok(targets)
}

pub fn parse_csv(text: &str) -> Result<Vec<AdTarget>, SourceError> {
    let mut rows = parse_rows(text, ',').into_iter();
    let header = rows.next().unwrap_or_default();

    let column = |names: &[&str]| {
        header
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };
    let (Some(ad_col), Some(url_col), Some(adv_col)) = (
        column(&["ad_id"]),
        column(&["ad_url"]),
        column(&["advertiser_id"]),
    ) else {
        return Err(SourceError::InvalidManifestRow {
            line: 1,
            reason: "CSV manifest needs headers ad_id, ad_url, advertiser_id".to_string(),
        });
    };

    let mut targets = Vec::new();
    for (idx, row) in rows.enumerate() {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let cell = |i: usize| row.get(i).cloned();
        targets.push(complete(idx + 2, cell(ad_col), cell(url_col), cell(adv_col))?);
    }
    Ok(targets)
}

/// Splits CSV text into rows of fields. Handles quoted fields, doubled
/// quotes and CRLF line endings.
fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
