//! URL helpers for Transparency Center creatives and advertiser click-through links.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

static RE_CREATIVE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/advertiser/(AR[0-9]+)/creative/(CR[0-9]+)").unwrap());
static RE_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:[^0-9]").unwrap());

/// Query parameters that only carry click attribution.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "dclid", "gclsrc", "fbclid", "mc_eid", "mc_cid", "_hsenc", "_hsmi",
];

/// Extracts `(advertiser_id, creative_id)` from a Transparency Center creative URL.
pub fn parse_ids_from_url(url: &str) -> Option<(String, String)> {
    let caps = RE_CREATIVE_URL.captures(url)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Builds the public Transparency Center URL of a creative.
pub fn creative_page_url(advertiser_id: &str, ad_id: &str) -> String {
    format!(
        "https://adstransparency.google.com/advertiser/{}/creative/{}?region=US",
        advertiser_id, ad_id
    )
}

/// Returns the first non-empty URL in capture order.
pub fn select_primary_click_url<S: AsRef<str>>(urls: &[S]) -> Option<&str> {
    urls.iter().map(AsRef::as_ref).find(|u| !u.is_empty())
}

/// Reduces a captured click URL to the advertiser landing page.
///
/// Google-owned help pages and image-serving hosts yield `None`. Ad-click
/// redirectors are unwrapped through their `adurl` parameter. Attribution
/// parameters are removed and a missing scheme defaults to `https`.
pub fn normalize_click_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let parsed = parse_lenient(url)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    let path = parsed.path().to_lowercase();

    if host.ends_with("support.google.com") || host.ends_with("pagead2.googlesyndication.com") {
        return None;
    }
    if host.ends_with("tpc.googlesyndication.com")
        && (path.starts_with("/simgad") || path.contains("discover_ads"))
    {
        return None;
    }

    if host.ends_with("googleadservices.com")
        || (host.ends_with("googleads.g.doubleclick.net") && path.contains("pagead/conversion"))
    {
        let target = parsed
            .query_pairs()
            .find(|(k, _)| k == "adurl")
            .map(|(_, v)| v.into_owned())?;
        return normalize_click_url(&target);
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()) && !k.starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = parsed.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    Some(cleaned.to_string())
}

/// Parses absolute URLs and scheme-less ones (`//host/x`, `host/x`) as https.
/// Any other explicit scheme is returned as parsed so the caller can reject it.
fn parse_lenient(url: &str) -> Option<Url> {
    if RE_SCHEME.is_match(url) {
        return Url::parse(url).ok();
    }
    let rebuilt = if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        format!("https://{}", url)
    };
    Url::parse(&rebuilt).ok()
}

/// Resolves `href` against `base`, returning `None` for unusable references.
pub fn resolve_against(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("data:") || href.starts_with("javascript:") {
        return None;
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwraps_adservices_redirect_and_strips_trackers() {
        let url = "https://www.googleadservices.com/pagead/aclk?adurl=https://example.com/path?utm_campaign=test&gclid=abc";
        assert_eq!(
            normalize_click_url(url).as_deref(),
            Some("https://example.com/path")
        );
    }

    #[test]
    fn test_rejects_empty_and_non_http() {
        assert_eq!(normalize_click_url(""), None);
        assert_eq!(normalize_click_url("mailto:someone@example.com"), None);
        assert_eq!(normalize_click_url("javascript:void(0)"), None);
    }

    #[test]
    fn test_rejects_google_hosts() {
        assert_eq!(
            normalize_click_url("https://support.google.com/adspolicy/answer/1"),
            None
        );
        assert_eq!(
            normalize_click_url("https://tpc.googlesyndication.com/simgad/123"),
            None
        );
        assert_eq!(
            normalize_click_url("https://tpc.googlesyndication.com/archive/discover_ads/x"),
            None
        );
        assert_eq!(
            normalize_click_url("https://pagead2.googlesyndication.com/pcs/click"),
            None
        );
    }

    #[test]
    fn test_redirect_without_adurl_is_dropped() {
        assert_eq!(
            normalize_click_url("https://www.googleadservices.com/pagead/aclk?sa=L"),
            None
        );
    }

    #[test]
    fn test_doubleclick_conversion_redirect() {
        let url = "https://googleads.g.doubleclick.net/pagead/conversion/1/?adurl=https%3A%2F%2Fvote.example.org%2F%3Fref%3Dad%26utm_source%3Dg";
        assert_eq!(
            normalize_click_url(url).as_deref(),
            Some("https://vote.example.org/?ref=ad")
        );
    }

    #[test]
    fn test_keeps_non_tracking_params_and_defaults_scheme() {
        assert_eq!(
            normalize_click_url("//example.org/donate?amount=5&fbclid=zz").as_deref(),
            Some("https://example.org/donate?amount=5")
        );
        assert_eq!(
            normalize_click_url("example.org/about").as_deref(),
            Some("https://example.org/about")
        );
    }

    #[test]
    fn test_parse_ids_from_url() {
        let url = "https://adstransparency.google.com/advertiser/AR123/creative/CR999?region=US";
        assert_eq!(
            parse_ids_from_url(url),
            Some(("AR123".to_string(), "CR999".to_string()))
        );
        assert_eq!(parse_ids_from_url("https://example.com/"), None);
    }

    #[test]
    fn test_select_primary_click_url() {
        assert_eq!(select_primary_click_url::<&str>(&[]), None);
        assert_eq!(
            select_primary_click_url(&["", "https://a.example", "https://b.example"]),
            Some("https://a.example")
        );
    }

    #[test]
    fn test_resolve_against() {
        assert_eq!(
            resolve_against("https://tpc.example.com/sadbundle/1/index.html", "img/ad.png")
                .as_deref(),
            Some("https://tpc.example.com/sadbundle/1/img/ad.png")
        );
        assert_eq!(resolve_against("https://x.example/", "data:image/png;base64,AA"), None);
    }
}
