use beacon_common::DataCategory;
use parking_lot::Mutex;

use crate::{
    DEFAULT_RETRY_AFTER_SECS, RateLimitCategory, RateLimits, RetryAfter, format_rate_limits,
    parse_rate_limits, parse_retry_after,
};

/// Rate limit signals extracted from a collector response.
///
/// The dedicated rate limits header takes precedence. Without it, a `429` response limits all
/// categories for the duration in `Retry-After`, or for [`DEFAULT_RETRY_AFTER_SECS`] if that header
/// is missing or malformed.
#[derive(Debug)]
pub struct ResponseRateLimits {
    too_many_requests: bool,
    retry_after: Option<RetryAfter>,
    rate_limits: Option<String>,
}

impl ResponseRateLimits {
    /// Starts collecting signals of a response.
    ///
    /// `too_many_requests` is `true` if the response status is `429`.
    pub fn new(too_many_requests: bool) -> Self {
        Self {
            too_many_requests,
            retry_after: None,
            rate_limits: None,
        }
    }

    /// Adds the value of the `Retry-After` header.
    pub fn retry_after(mut self, header: Option<&str>) -> Self {
        self.retry_after = header.and_then(parse_retry_after);
        self
    }

    /// Adds the value of the `X-Sentry-Rate-Limits` header.
    ///
    /// Responses may carry this header more than once; join the values with `, `.
    pub fn rate_limits(mut self, header: Option<&str>) -> Self {
        self.rate_limits = header.filter(|h| !h.trim().is_empty()).map(str::to_owned);
        self
    }

    /// Returns `true` if the response carried any rate limiting signal.
    pub fn is_limited(&self) -> bool {
        self.too_many_requests || self.rate_limits.is_some()
    }

    /// Converts the signals into rate limits, or `None` if the response does not limit anything.
    pub fn into_rate_limits(self) -> Option<RateLimits> {
        if let Some(ref header) = self.rate_limits {
            return Some(parse_rate_limits(header));
        }

        if !self.too_many_requests {
            return None;
        }

        let retry_after = self
            .retry_after
            .unwrap_or_else(|| RetryAfter::from_secs(DEFAULT_RETRY_AFTER_SECS));

        let mut rate_limits = RateLimits::new();
        rate_limits.add(RateLimitCategory::All, retry_after);
        Some(rate_limits)
    }
}

/// Shared rate limit state of a transport.
///
/// All reads and writes of deadlines go through an internal lock, so the limiter can be shared
/// between worker threads.
#[derive(Debug, Default)]
pub struct RateLimiter {
    limits: Mutex<RateLimits>,
}

impl RateLimiter {
    /// Creates a limiter without active limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the category or the wildcard is still limited.
    ///
    /// The wildcard applies to every category, including client reports.
    pub fn is_limited(&self, category: DataCategory) -> bool {
        self.limits.lock().is_limited(category)
    }

    /// Stores new deadlines. Later updates for a category replace earlier ones.
    pub fn update(&self, rate_limits: Option<RateLimits>) {
        let Some(rate_limits) = rate_limits else {
            return;
        };

        beacon_log::debug!(
            "rate limited by collector: {}",
            format_rate_limits(&rate_limits)
        );

        let mut limits = self.limits.lock();
        limits.clean_expired();
        limits.merge(rate_limits);
    }

    /// Returns a snapshot of the currently active limits.
    pub fn current(&self) -> RateLimits {
        let mut limits = self.limits.lock().clone();
        limits.clean_expired();
        limits
    }
}
