//! Builders and fakes for creating test data programmatically.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};

use gatc_scraper::capture::{CapturedVariant, CreativeRenderer, RenderOutcome};
use gatc_scraper::config::{AdType, RetryPolicy, Selection};
use gatc_scraper::error::{CaptureError, SourceError};
use gatc_scraper::source::{AdCatalog, AdTarget, StreamQuery, TargetPages};
use gatc_scraper::PipelineConfig;

pub const TEST_BUCKET: &str = "test-bucket";

/// Builder for creating `PipelineConfig` instances.
pub struct PipelineConfigBuilder {
    ad_type: AdType,
    concurrency: usize,
    dry_run: bool,
    selection: Selection,
    retry: RetryPolicy,
}

impl PipelineConfigBuilder {
    /// Image ads, one worker, two immediate retries and no pacing.
    pub fn new() -> Self {
        Self {
            ad_type: AdType::Image,
            concurrency: 1,
            dry_run: false,
            selection: Selection::default(),
            retry: RetryPolicy {
                max_retries: 2,
                base: Duration::ZERO,
                jitter: Duration::ZERO,
                pacing: None,
            },
        }
    }

    pub fn ad_type(mut self, ad_type: AdType) -> Self {
        self.ad_type = ad_type;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.retry.max_retries = n;
        self
    }

    pub fn max_ads(mut self, n: u64) -> Self {
        self.selection.max_ads = Some(n);
        self
    }

    pub fn skip_advertiser(mut self, advertiser_id: &str) -> Self {
        self.selection
            .skip_advertisers
            .insert(advertiser_id.to_string());
        self
    }

    pub fn rescrape_done(mut self, enabled: bool) -> Self {
        self.selection.rescrape_done = enabled;
        self
    }

    pub fn shard(mut self, shard: u32, shard_count: u32) -> Self {
        self.selection.shard = shard;
        self.selection.shard_count = shard_count;
        self
    }

    pub fn ad_id(mut self, ad_id: &str) -> Self {
        self.selection.ad_id = Some(ad_id.to_string());
        self
    }

    pub fn ad_url(mut self, url: &str) -> Self {
        self.selection.ad_url = Some(url.to_string());
        self
    }

    pub fn manifest(mut self, path: PathBuf) -> Self {
        self.selection.manifest_path = Some(path);
        self
    }

    pub fn build(self) -> PipelineConfig {
        PipelineConfig {
            ad_type: self.ad_type,
            gcs_bucket: TEST_BUCKET.to_string(),
            scraper_version: format!("{}:test", self.ad_type),
            concurrency: self.concurrency,
            dry_run: self.dry_run,
            selection: self.selection,
            retry: self.retry,
        }
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Transparency Center URL for a creative.
pub fn ad_url(advertiser_id: &str, ad_id: &str) -> String {
    format!(
        "https://adstransparency.google.com/advertiser/{}/creative/{}?region=US",
        advertiser_id, ad_id
    )
}

pub fn target(ad_id: &str, advertiser_id: &str) -> AdTarget {
    AdTarget::new(ad_id, ad_url(advertiser_id, ad_id), advertiser_id)
}

/// Solid opaque PNG.
pub fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([rgb[0], rgb[1], rgb[2], 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}

/// A sadbundle capture with the given pixels and click URLs.
pub fn variant(bytes: Vec<u8>, click_urls: &[&str]) -> CapturedVariant {
    CapturedVariant {
        render_method: "sadbundle".to_string(),
        capture_method: "img".to_string(),
        capture_target: "sadbundle_img".to_string(),
        source_url: Some("https://tpc.googlesyndication.com/simgad/123".to_string()),
        bytes,
        click_urls: click_urls.iter().map(|u| u.to_string()).collect(),
    }
}

/// One scripted render result.
#[derive(Debug, Clone)]
pub enum Step {
    Outcome(RenderOutcome),
    Fail(String),
    Restart(String),
}

impl Step {
    fn play(&self) -> Result<RenderOutcome, CaptureError> {
        match self {
            Step::Outcome(outcome) => Ok(outcome.clone()),
            Step::Fail(message) => Err(CaptureError::ImageNotFound(message.clone())),
            Step::Restart(reason) => Err(CaptureError::RestartRequired(reason.clone())),
        }
    }
}

/// Renderer that replays a script per ad. The last step repeats once the
/// script runs out; unscripted ads render no variants.
#[derive(Default)]
pub struct ScriptedRenderer {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, ad_id: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .expect("script lock")
            .insert(ad_id.to_string(), steps.into());
        self
    }

    /// Render calls across all ads.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CreativeRenderer for ScriptedRenderer {
    async fn render(&self, target: &AdTarget) -> Result<RenderOutcome, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock().expect("script lock");
        let Some(steps) = scripts.get_mut(&target.ad_id) else {
            return Ok(RenderOutcome::Variants(Vec::new()));
        };
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        };
        match step {
            Some(step) => step.play(),
            None => Ok(RenderOutcome::Variants(Vec::new())),
        }
    }
}

/// Renderer that takes `delay` per ad and then raises `shutdown`, as an
/// operator interrupt arriving mid-run would.
pub struct InterruptingRenderer {
    pub delay: Duration,
    pub shutdown: Arc<AtomicBool>,
    calls: AtomicUsize,
}

impl InterruptingRenderer {
    pub fn new(delay: Duration, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            delay,
            shutdown,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CreativeRenderer for InterruptingRenderer {
    async fn render(&self, _target: &AdTarget) -> Result<RenderOutcome, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.shutdown.store(true, Ordering::SeqCst);
        Ok(RenderOutcome::Variants(Vec::new()))
    }
}

/// Catalog serving fixed pages and single-ad lookups.
#[derive(Default)]
pub struct FakeCatalog {
    pages: Vec<Vec<AdTarget>>,
    known: HashMap<String, AdTarget>,
    pub queries: Mutex<Vec<StreamQuery>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, targets: Vec<AdTarget>) -> Self {
        for t in &targets {
            self.known.insert(t.ad_id.clone(), t.clone());
        }
        self.pages.push(targets);
        self
    }
}

#[async_trait]
impl AdCatalog for FakeCatalog {
    async fn find_ad(
        &self,
        _ad_type: AdType,
        ad_id: &str,
    ) -> Result<Option<AdTarget>, SourceError> {
        Ok(self.known.get(ad_id).cloned())
    }

    async fn stream(&self, query: &StreamQuery) -> Result<Box<dyn TargetPages>, SourceError> {
        self.queries.lock().expect("query lock").push(query.clone());
        Ok(Box::new(VecPages {
            pages: self.pages.clone().into(),
        }))
    }
}

struct VecPages {
    pages: VecDeque<Vec<AdTarget>>,
}

#[async_trait]
impl TargetPages for VecPages {
    async fn next_page(&mut self) -> Result<Option<Vec<AdTarget>>, SourceError> {
        Ok(self.pages.pop_front())
    }
}

/// Ad ids of `targets`, for order-free assertions.
pub fn ids(targets: &[AdTarget]) -> HashSet<String> {
    targets.iter().map(|t| t.ad_id.clone()).collect()
}
