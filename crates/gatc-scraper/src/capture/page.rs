//! Markup scanning for Transparency Center creative pages and sadbundle frames.
//!
//! The pages are server rendered closely enough that start tags and their
//! attributes carry everything the capture stage needs. Matching is
//! case-insensitive on tag and attribute names; nesting is only tracked
//! where a region (e.g. `creative-details`) must be bounded.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::capture::TerminalStatus;
use crate::urls::resolve_against;

static RE_START_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<([A-Za-z][A-Za-z0-9-]*)((?:\s[^<>]*?)?)/?>").unwrap());
static RE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .unwrap()
});
static RE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static RE_HIDDEN_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(display\s*:\s*none|visibility\s*:\s*hidden)").unwrap());

/// A start tag and its attributes.
#[derive(Debug, Clone)]
pub struct Tag {
    /// Lowercased element name.
    pub name: String,
    attrs: Vec<(String, String)>,
    /// Byte offsets of the tag itself within the document.
    pub span: Range<usize>,
}

impl Tag {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|c| c == class))
    }

    fn class_contains(&self, fragment: &str) -> bool {
        self.attr("class").is_some_and(|c| c.contains(fragment))
    }

    /// Hidden through the `hidden` attribute or an inline style.
    pub fn is_hidden(&self) -> bool {
        self.attr("hidden").is_some()
            || self.attr("aria-hidden") == Some("true")
            || self.attr("style").is_some_and(|s| RE_HIDDEN_STYLE.is_match(s))
    }

    fn dimension(&self, name: &str) -> Option<u32> {
        let raw = self.attr(name)?.trim().trim_end_matches("px");
        raw.parse::<f64>().ok().map(|v| v.max(0.0).round() as u32)
    }
}

/// Every start tag of `html`, in document order.
pub fn start_tags(html: &str) -> Vec<Tag> {
    RE_START_TAG
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let attrs = caps
                .get(2)
                .map(|m| parse_attrs(m.as_str()))
                .unwrap_or_default();
            Some(Tag {
                name: caps[1].to_ascii_lowercase(),
                attrs,
                span: whole.start()..whole.end(),
            })
        })
        .collect()
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    RE_ATTR
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), value)
        })
        .collect()
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Byte range covered by the element opened at `tag`, up to its matching
/// close tag (or the end of the document when it is never closed).
fn element_range(html: &str, tag: &Tag) -> Range<usize> {
    let Ok(re) = Regex::new(&format!(r"(?i)<(/?){}\b[^>]*?(/?)>", regex::escape(&tag.name)))
    else {
        return tag.span.clone();
    };
    let mut depth = 1usize;
    for caps in re.captures_iter(&html[tag.span.end..]) {
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let self_closing = caps.get(2).is_some_and(|m| !m.as_str().is_empty());
        if closing {
            depth -= 1;
            if depth == 0 {
                let end = caps.get(0).map_or(html.len(), |m| tag.span.end + m.end());
                return tag.span.start..end;
            }
        } else if !self_closing {
            depth += 1;
        }
    }
    tag.span.start..html.len()
}

fn within(ranges: &[Range<usize>], pos: usize) -> bool {
    ranges.iter().any(|r| r.contains(&pos))
}

/// Document `<title>` text.
pub fn page_title(html: &str) -> Option<String> {
    RE_TITLE
        .captures(html)
        .map(|caps| caps[1].trim().to_string())
}

/// Detects the pages that end an ad without a capture.
///
/// Checked in order: a visible policy violation banner, a render failure
/// container, the rate-limit error page, then an empty result without any
/// creative container.
pub fn classify_page(html: &str) -> Option<TerminalStatus> {
    let tags = start_tags(html);

    if tags
        .iter()
        .any(|t| t.name == "div" && t.has_class("policy-violation-banner") && !t.is_hidden())
    {
        return Some(TerminalStatus::RemovedForPolicyViolation);
    }

    if tags.iter().any(|t| {
        t.name == "div" && (t.has_class("render-failed") || t.has_class("render-failed-container"))
    }) {
        return Some(TerminalStatus::VariationUnavailable);
    }

    let title_429 = page_title(html).is_some_and(|t| t.contains("Error 429"));
    if title_429 || tags.iter().any(|t| t.id() == Some("af-error-container")) {
        return Some(TerminalStatus::RateLimited);
    }

    let empty = tags
        .iter()
        .any(|t| t.name == "div" && t.has_class("empty-results"));
    let has_creative = tags
        .iter()
        .any(|t| t.has_class("creative-container") || t.name == "creative-details");
    if empty && !has_creative {
        return Some(TerminalStatus::NotFound);
    }

    None
}

/// Sadbundle iframe URLs, resolved against the page URL.
pub fn find_sadbundle_frames(html: &str, base: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in start_tags(html) {
        if tag.name != "iframe" {
            continue;
        }
        let Some(src) = tag.attr("src").filter(|s| s.contains("sadbundle")) else {
            continue;
        };
        if let Some(url) = resolve_against(base, src) {
            if !out.contains(&url) {
                out.push(url);
            }
        }
    }
    out
}

/// Locates the creative image inside a sadbundle frame document.
///
/// Tries `img.img_ad`, then the image of the `a#aw0` anchor, then any image
/// inside `#google_image_div`.
pub fn find_sadbundle_image(html: &str, base: &str) -> Option<String> {
    let tags = start_tags(html);
    let src_of = |t: &Tag| t.attr("src").and_then(|s| resolve_against(base, s));

    if let Some(url) = tags
        .iter()
        .filter(|t| t.name == "img" && t.has_class("img_ad"))
        .find_map(src_of)
    {
        return Some(url);
    }

    if let Some(anchor) = tags.iter().find(|t| t.name == "a" && t.id() == Some("aw0")) {
        let region = element_range(html, anchor);
        if let Some(url) = tags
            .iter()
            .filter(|t| t.name == "img" && region.contains(&t.span.start))
            .find_map(src_of)
        {
            return Some(url);
        }
    }

    let container = tags.iter().find(|t| t.id() == Some("google_image_div"))?;
    let region = element_range(html, container);
    tags.iter()
        .filter(|t| t.name == "img" && region.contains(&t.span.start))
        .find_map(src_of)
}

/// Creative images rendered directly on the page, outside the targeting
/// criteria block.
pub fn find_creative_images(html: &str, base: &str) -> Vec<String> {
    let tags = start_tags(html);
    let regions: Vec<Range<usize>> = tags
        .iter()
        .filter(|t| t.name == "creative-details" || t.has_class("creative-details-container"))
        .map(|t| element_range(html, t))
        .collect();
    let excluded: Vec<Range<usize>> = tags
        .iter()
        .filter(|t| t.name == "targeting-criteria" || t.class_contains("targeting-criteria"))
        .map(|t| element_range(html, t))
        .collect();

    let mut out: Vec<String> = Vec::new();
    for tag in &tags {
        if tag.name != "img" || !within(&regions, tag.span.start) {
            continue;
        }
        if within(&excluded, tag.span.start) {
            continue;
        }
        if let Some(url) = tag.attr("src").and_then(|s| resolve_against(base, s)) {
            if !out.contains(&url) {
                out.push(url);
            }
        }
    }
    out
}

/// Absolute http(s) anchor targets in document order, without duplicates.
pub fn find_anchor_hrefs(html: &str, base: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in start_tags(html) {
        if tag.name != "a" {
            continue;
        }
        let Some(url) = tag.attr("href").and_then(|h| resolve_against(base, h)) else {
            continue;
        };
        if url.starts_with("http") && !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

/// One iframe as listed by [`frame_inventory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameInfo {
    pub id: String,
    pub src: String,
    pub w: Option<u32>,
    pub h: Option<u32>,
}

/// Every iframe of the page with its declared size.
pub fn frame_inventory(html: &str) -> Vec<FrameInfo> {
    start_tags(html)
        .into_iter()
        .filter(|t| t.name == "iframe")
        .map(|t| FrameInfo {
            id: t.id().unwrap_or_default().to_string(),
            src: t.attr("src").unwrap_or_default().to_string(),
            w: t.dimension("width"),
            h: t.dimension("height"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://adstransparency.google.com/advertiser/AR1/creative/CR1?region=US";

    #[test]
    fn test_start_tags_parse_attributes() {
        let tags = start_tags(r#"<DIV Class="a b" data-x='1' hidden><img src=/x.png alt="&amp;"/>"#);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "div");
        assert!(tags[0].has_class("b"));
        assert!(!tags[0].has_class("a b"));
        assert_eq!(tags[0].attr("data-x"), Some("1"));
        assert!(tags[0].is_hidden());
        assert_eq!(tags[1].attr("src"), Some("/x.png"));
        assert_eq!(tags[1].attr("alt"), Some("&"));
    }

    #[test]
    fn test_classify_policy_banner() {
        let html = r#"<div class="policy-violation-banner">Removed</div><div class="creative-container"></div>"#;
        assert_eq!(classify_page(html), Some(TerminalStatus::RemovedForPolicyViolation));

        let hidden = r#"<div class="policy-violation-banner" style="display: none"></div><div class="creative-container"></div>"#;
        assert_eq!(classify_page(hidden), None);
    }

    #[test]
    fn test_classify_render_failed() {
        let html = r#"<div class="render-failed-container"><div class="render-failed">x</div></div>"#;
        assert_eq!(classify_page(html), Some(TerminalStatus::VariationUnavailable));
    }

    #[test]
    fn test_classify_rate_limited() {
        let html = "<html><head><title>Error 429 (Too Many Requests)</title></head></html>";
        assert_eq!(classify_page(html), Some(TerminalStatus::RateLimited));
        let html = r#"<div id="af-error-container">Sorry</div>"#;
        assert_eq!(classify_page(html), Some(TerminalStatus::RateLimited));
    }

    #[test]
    fn test_classify_not_found_only_without_creative() {
        let html = r#"<div class="empty-results">No ads</div>"#;
        assert_eq!(classify_page(html), Some(TerminalStatus::NotFound));
        let html = r#"<div class="empty-results"></div><creative-details><img src="a.png"></creative-details>"#;
        assert_eq!(classify_page(html), None);
    }

    #[test]
    fn test_policy_banner_wins_over_rate_limit() {
        let html = r#"<title>Error 429</title><div class="policy-violation-banner"></div>"#;
        assert_eq!(classify_page(html), Some(TerminalStatus::RemovedForPolicyViolation));
    }

    #[test]
    fn test_find_sadbundle_frames() {
        let html = r#"
            <iframe id="fletch-render-1" src="https://tpc.googlesyndication.com/archive/sadbundle/$csp%3Der3$/1.html"></iframe>
            <iframe src="/adframe?x=1"></iframe>
            <iframe src="https://tpc.googlesyndication.com/archive/sadbundle/$csp%3Der3$/1.html"></iframe>"#;
        let frames = find_sadbundle_frames(html, BASE);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("/sadbundle/"));
    }

    #[test]
    fn test_find_sadbundle_image_selector_order() {
        let html = r#"<a id="aw0" href="https://x"><img src="anchor.png"></a><img class="img_ad" src="main.png">"#;
        assert_eq!(
            find_sadbundle_image(html, "https://tpc.googlesyndication.com/sadbundle/1/index.html")
                .as_deref(),
            Some("https://tpc.googlesyndication.com/sadbundle/1/main.png")
        );

        let html = r#"<div><img src="other.png"></div><a id="aw0"><img src="anchor.png"></a>"#;
        assert_eq!(
            find_sadbundle_image(html, "https://h/f/index.html").as_deref(),
            Some("https://h/f/anchor.png")
        );

        let html = r#"<div id="google_image_div"><div><img src="//cdn/img.jpg"></div></div>"#;
        assert_eq!(
            find_sadbundle_image(html, "https://h/f/index.html").as_deref(),
            Some("https://cdn/img.jpg")
        );

        assert_eq!(find_sadbundle_image("<img src='x.png'>", "https://h/"), None);
    }

    #[test]
    fn test_find_creative_images_skips_targeting() {
        let html = r#"
            <img src="/logo.png">
            <creative-details>
              <div class="creative-details-container">
                <img src="/ad.png">
                <div class="targeting-criteria"><img src="/map.png"></div>
                <img src="/ad.png">
              </div>
            </creative-details>
            <img src="/footer.png">"#;
        assert_eq!(
            find_creative_images(html, BASE),
            vec!["https://adstransparency.google.com/ad.png".to_string()]
        );
    }

    #[test]
    fn test_find_anchor_hrefs() {
        let html = r##"<a href="https://example.com/a">a</a><a href="#top">t</a>
            <a href="javascript:void(0)">j</a><a href="https://example.com/a">dup</a><a href="/rel">r</a>"##;
        assert_eq!(
            find_anchor_hrefs(html, "https://h/p"),
            vec![
                "https://example.com/a".to_string(),
                "https://h/p#top".to_string(),
                "https://h/rel".to_string(),
            ]
        );
    }

    #[test]
    fn test_frame_inventory() {
        let html = r#"<iframe id="f1" src="/a" width="300" height="250px"></iframe><iframe src="/b"></iframe>"#;
        let frames = frame_inventory(html);
        assert_eq!(
            frames,
            vec![
                FrameInfo { id: "f1".into(), src: "/a".into(), w: Some(300), h: Some(250) },
                FrameInfo { id: "".into(), src: "/b".into(), w: None, h: None },
            ]
        );
    }
}
