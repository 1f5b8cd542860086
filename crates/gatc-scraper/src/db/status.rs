//! Values of `ads.status`.

use std::fmt;

/// `last_error` of a variant the page does not offer. Stored with status
/// `error` but treated as terminal.
pub const VARIATION_UNAVAILABLE: &str = "variation_unavailable";

/// Lifecycle state of an `(ad_id, variant_id)` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdStatus {
    Pending,
    Done,
    Error,
    RemovedForPolicyViolation,
    RateLimited,
    NotFound,
}

impl AdStatus {
    pub const ALL: [AdStatus; 6] = [
        AdStatus::Pending,
        AdStatus::Done,
        AdStatus::Error,
        AdStatus::RemovedForPolicyViolation,
        AdStatus::RateLimited,
        AdStatus::NotFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdStatus::Pending => "pending",
            AdStatus::Done => "done",
            AdStatus::Error => "error",
            AdStatus::RemovedForPolicyViolation => "removed_for_policy_violation",
            AdStatus::RateLimited => "rate_limited_429",
            AdStatus::NotFound => "not_found",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Statuses the streaming producer picks up again without `--rescrape-done`.
    pub fn is_retryable(value: &str) -> bool {
        matches!(
            Self::parse(value),
            Some(AdStatus::Pending | AdStatus::Error | AdStatus::RateLimited)
        )
    }
}

impl fmt::Display for AdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_names() {
        for status in AdStatus::ALL {
            assert_eq!(AdStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AdStatus::parse("variation_unavailable"), None);
    }

    #[test]
    fn test_retryable() {
        assert!(AdStatus::is_retryable("pending"));
        assert!(AdStatus::is_retryable("error"));
        assert!(AdStatus::is_retryable("rate_limited_429"));
        assert!(!AdStatus::is_retryable("done"));
        assert!(!AdStatus::is_retryable("not_found"));
        assert!(!AdStatus::is_retryable("removed_for_policy_violation"));
        assert!(!AdStatus::is_retryable("something_else"));
    }
}
