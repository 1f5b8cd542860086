use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::StatusCode;

use crate::capture::settle::{settle_animation, SettleParams};
use crate::capture::{page, CapturedVariant, CreativeRenderer, RenderOutcome, TerminalStatus};
use crate::config::CaptureSettings;
use crate::error::CaptureError;
use crate::source::AdTarget;
use crate::urls::creative_page_url;

/// Timeout of a single image download.
const IMAGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Captures creatives from server-rendered markup: sadbundle frames first,
/// then images placed directly in the creative details.
pub struct HttpRenderer {
    http: reqwest::Client,
    settings: CaptureSettings,
    settle: SettleParams,
}

impl HttpRenderer {
    pub fn new(settings: CaptureSettings) -> Result<Self, CaptureError> {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(CaptureError::Client)?;
        Ok(Self::with_client(http, settings))
    }

    pub fn with_client(http: reqwest::Client, settings: CaptureSettings) -> Self {
        Self {
            http,
            settings,
            settle: SettleParams::default(),
        }
    }

    async fn get(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<reqwest::Response, CaptureError> {
        let mut request = self.http.get(url).timeout(timeout);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        request.send().await.map_err(|e| CaptureError::Http {
            url: url.to_string(),
            source: e,
        })
    }

    async fn fetch_text(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<String, CaptureError> {
        let resp = self.get(url, referer, timeout).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CaptureError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(|e| CaptureError::Http {
            url: url.to_string(),
            source: e,
        })
    }

    async fn fetch_image(&self, url: &str, referer: &str) -> Result<Vec<u8>, CaptureError> {
        let resp = self.get(url, Some(referer), IMAGE_TIMEOUT).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CaptureError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await.map_err(|e| CaptureError::Http {
            url: url.to_string(),
            source: e,
        })?;
        if bytes.is_empty() {
            return Err(CaptureError::ImageNotFound(url.to_string()));
        }

        match settle_animation(&bytes, self.settle) {
            Ok(Some(png)) => Ok(png),
            Ok(None) => Ok(bytes.to_vec()),
            Err(e) => {
                tracing::debug!(event = "animation_settle_error", url = url, error = %e);
                Ok(bytes.to_vec())
            }
        }
    }

    async fn capture_sadbundle(
        &self,
        frame_url: &str,
        page_url: &str,
    ) -> Result<CapturedVariant, CaptureError> {
        let frame = self
            .fetch_text(frame_url, Some(page_url), self.settings.iframe_timeout)
            .await?;
        let image_url = page::find_sadbundle_image(&frame, frame_url)
            .ok_or_else(|| CaptureError::ImageNotFound(frame_url.to_string()))?;
        let bytes = self.fetch_image(&image_url, frame_url).await?;

        Ok(CapturedVariant {
            render_method: "sadbundle".to_string(),
            capture_method: "img".to_string(),
            capture_target: "sadbundle_img".to_string(),
            source_url: Some(image_url),
            bytes,
            click_urls: page::find_anchor_hrefs(&frame, frame_url),
        })
    }

    async fn capture_image(
        &self,
        image_url: &str,
        page_url: &str,
    ) -> Result<CapturedVariant, CaptureError> {
        let bytes = self.fetch_image(image_url, page_url).await?;
        Ok(CapturedVariant {
            render_method: "image".to_string(),
            capture_method: "img".to_string(),
            capture_target: "img[src]".to_string(),
            source_url: Some(image_url.to_string()),
            bytes,
            click_urls: Vec::new(),
        })
    }

    async fn save_debug_html(&self, ad_id: &str, html: &str) {
        let path: PathBuf = self.settings.debug_dir.join(format!("page_{}.html", ad_id));
        let result = async {
            tokio::fs::create_dir_all(&self.settings.debug_dir).await?;
            tokio::fs::write(&path, html).await
        }
        .await;
        match result {
            Ok(()) => tracing::info!(event = "debug_html_saved", path = %path.display()),
            Err(e) => tracing::warn!(event = "debug_save_html_error", error = %e),
        }
    }
}

#[async_trait]
impl CreativeRenderer for HttpRenderer {
    async fn render(&self, target: &AdTarget) -> Result<RenderOutcome, CaptureError> {
        let page_url = if target.ad_url.is_empty() {
            creative_page_url(&target.advertiser_id, &target.ad_id)
        } else {
            target.ad_url.clone()
        };

        let resp = self.get(&page_url, None, self.settings.page_timeout).await?;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Ok(RenderOutcome::Terminal(TerminalStatus::RateLimited));
        }
        if !resp.status().is_success() {
            return Err(CaptureError::Status {
                url: page_url,
                status: resp.status().as_u16(),
            });
        }
        let html = resp.text().await.map_err(|e| CaptureError::Http {
            url: page_url.clone(),
            source: e,
        })?;

        if self.settings.debug_html {
            self.save_debug_html(&target.ad_id, &html).await;
        }
        if self.settings.debug_frames {
            let frames = page::frame_inventory(&html);
            tracing::info!(
                event = "frame_inventory",
                count = frames.len(),
                frames = %serde_json::to_string(&frames).unwrap_or_default(),
            );
        }

        if let Some(status) = page::classify_page(&html) {
            return Ok(RenderOutcome::Terminal(status));
        }

        let mut variants: Vec<CapturedVariant> = Vec::new();
        let mut attempt = 0u32;

        for frame_url in page::find_sadbundle_frames(&html, &page_url) {
            if !self.settings.all_variants && !variants.is_empty() {
                break;
            }
            attempt += 1;
            tracing::info!(
                event = "variant_attempt",
                attempt = attempt,
                render_method = "sadbundle",
                target = %frame_url,
            );
            match self.capture_sadbundle(&frame_url, &page_url).await {
                Ok(variant) => variants.push(variant),
                Err(e) => tracing::warn!(
                    event = "variant_capture_error",
                    attempt = attempt,
                    target = %frame_url,
                    error = %e,
                ),
            }
        }

        if variants.is_empty() || self.settings.all_variants {
            for image_url in page::find_creative_images(&html, &page_url) {
                if !self.settings.all_variants && !variants.is_empty() {
                    break;
                }
                if variants
                    .iter()
                    .any(|v| v.source_url.as_deref() == Some(image_url.as_str()))
                {
                    continue;
                }
                attempt += 1;
                tracing::info!(
                    event = "variant_attempt",
                    attempt = attempt,
                    render_method = "image",
                    target = %image_url,
                );
                match self.capture_image(&image_url, &page_url).await {
                    Ok(variant) => variants.push(variant),
                    Err(e) => tracing::warn!(
                        event = "variant_capture_error",
                        attempt = attempt,
                        target = %image_url,
                        error = %e,
                    ),
                }
            }
        }

        Ok(RenderOutcome::Variants(variants))
    }
}
