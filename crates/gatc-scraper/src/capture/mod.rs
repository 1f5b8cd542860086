//! Creative capture: turns a Transparency Center target into image bytes.

pub mod http;
pub mod page;
pub mod settle;

use async_trait::async_trait;

use crate::db::status::{AdStatus, VARIATION_UNAVAILABLE};
use crate::error::CaptureError;
use crate::source::AdTarget;

pub use http::HttpRenderer;

/// Page states that finish an ad without any capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    RemovedForPolicyViolation,
    VariationUnavailable,
    RateLimited,
    NotFound,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalStatus::RemovedForPolicyViolation => "removed_for_policy_violation",
            TerminalStatus::VariationUnavailable => VARIATION_UNAVAILABLE,
            TerminalStatus::RateLimited => "rate_limited_429",
            TerminalStatus::NotFound => "not_found",
        }
    }

    /// How the status is stored: variation failures are errors tagged by
    /// `last_error`, the others are statuses of their own.
    pub fn record(&self) -> (AdStatus, Option<&'static str>) {
        match self {
            TerminalStatus::RemovedForPolicyViolation => (AdStatus::RemovedForPolicyViolation, None),
            TerminalStatus::VariationUnavailable => (AdStatus::Error, Some(VARIATION_UNAVAILABLE)),
            TerminalStatus::RateLimited => (AdStatus::RateLimited, None),
            TerminalStatus::NotFound => (AdStatus::NotFound, None),
        }
    }
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured creative variant.
#[derive(Debug, Clone)]
pub struct CapturedVariant {
    /// `sadbundle` or `image`.
    pub render_method: String,
    /// `img` for downloaded bytes.
    pub capture_method: String,
    /// Where the bytes came from, e.g. `sadbundle_img` or `img[src]`.
    pub capture_target: String,
    pub source_url: Option<String>,
    pub bytes: Vec<u8>,
    /// Click-through candidates in capture order.
    pub click_urls: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Terminal(TerminalStatus),
    /// Captures in variant order; may be empty.
    Variants(Vec<CapturedVariant>),
}

/// Produces the captures of one ad.
#[async_trait]
pub trait CreativeRenderer: Send + Sync {
    async fn render(&self, target: &AdTarget) -> Result<RenderOutcome, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_records() {
        assert_eq!(
            TerminalStatus::VariationUnavailable.record(),
            (AdStatus::Error, Some("variation_unavailable"))
        );
        assert_eq!(
            TerminalStatus::RateLimited.record(),
            (AdStatus::RateLimited, None)
        );
        assert_eq!(TerminalStatus::NotFound.to_string(), "not_found");
        assert_eq!(
            TerminalStatus::RemovedForPolicyViolation.record().0.as_str(),
            "removed_for_policy_violation"
        );
    }
}
