use std::fmt::{self, Write};
use std::str::FromStr;
use std::time::{Duration, Instant};

use beacon_common::DataCategory;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;

use crate::MAX_RETRY_AFTER_SECS;

/// A monotonic expiration marker for rate limits.
///
/// `RetryAfter` marks an instant at which a rate limit expires, which is indicated by `expired`. It
/// can convert into the remaining time until expiration.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RetryAfter {
    when: Instant,
}

impl RetryAfter {
    /// Creates a retry after instance.
    ///
    /// Delays are capped at [`MAX_RETRY_AFTER_SECS`].
    #[inline]
    pub fn from_secs(seconds: u64) -> Self {
        let now = Instant::now();
        let delay = Duration::from_secs(seconds.min(MAX_RETRY_AFTER_SECS));
        let when = now.checked_add(delay).unwrap_or(now);
        Self { when }
    }

    /// Returns the remaining duration until the rate limit expires.
    #[inline]
    pub fn remaining(self) -> Option<Duration> {
        let now = Instant::now();
        if now >= self.when {
            None
        } else {
            Some(self.when - now)
        }
    }

    /// Returns the remaining seconds until the rate limit expires.
    ///
    /// This is a shortcut to `retry_after.remaining().as_secs()` with one exception: If the rate
    /// limit has expired, this function returns `0`.
    #[inline]
    pub fn remaining_seconds(self) -> u64 {
        match self.remaining() {
            // Compensate for the missing subsec part by adding 1s
            Some(duration) if duration.subsec_nanos() == 0 => duration.as_secs(),
            Some(duration) => duration.as_secs() + 1,
            None => 0,
        }
    }

    /// Returns whether this rate limit has expired.
    #[inline]
    pub fn expired(self) -> bool {
        self.remaining().is_none()
    }
}

impl fmt::Debug for RetryAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remaining_seconds() {
            0 => write!(f, "RetryAfter(expired)"),
            remaining => write!(f, "RetryAfter({remaining}s)"),
        }
    }
}

/// Error parsing a `RetryAfter`.
#[derive(Debug)]
pub enum InvalidRetryAfter {
    /// The supplied delay in seconds was not valid.
    InvalidDelay(std::num::ParseFloatError),
    /// The supplied delay was infinite or not a number.
    NonFinite,
}

impl FromStr for RetryAfter {
    type Err = InvalidRetryAfter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let float = s.parse::<f64>().map_err(InvalidRetryAfter::InvalidDelay)?;
        if !float.is_finite() {
            return Err(InvalidRetryAfter::NonFinite);
        }

        let seconds = float.max(0.0).ceil() as u64;
        Ok(RetryAfter::from_secs(seconds))
    }
}

/// Parses the value of a `Retry-After` header.
///
/// The header carries either a delay in seconds or an HTTP date. Dates in the past yield an
/// already expired `RetryAfter`.
pub fn parse_retry_after(value: &str) -> Option<RetryAfter> {
    let value = value.trim();
    if let Ok(retry_after) = value.parse() {
        return Some(retry_after);
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let seconds = (date.with_timezone(&Utc) - Utc::now()).num_seconds().max(0);
    Some(RetryAfter::from_secs(seconds as u64))
}

/// The categories a rate limit applies to.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RateLimitCategory {
    /// The limit applies to every category.
    All,
    /// The limit applies to a single category.
    Category(DataCategory),
}

impl fmt::Display for RateLimitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => Ok(()),
            Self::Category(category) => write!(f, "{category}"),
        }
    }
}

/// A collection of active rate limits keyed by category.
///
/// Unlike a merge of quotas, adding a limit for a category that is already limited replaces the
/// previous deadline, even if the new one expires sooner.
#[derive(Clone, Debug, Default)]
pub struct RateLimits {
    limits: HashMap<RateLimitCategory, RetryAfter>,
}

impl RateLimits {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline for a category, replacing a previous one.
    pub fn add(&mut self, category: RateLimitCategory, retry_after: RetryAfter) {
        self.limits.insert(category, retry_after);
    }

    /// Adds all limits of `other`, replacing deadlines of categories present in both.
    pub fn merge(&mut self, other: RateLimits) {
        self.limits.extend(other.limits);
    }

    /// Returns `true` if the category or the wildcard has an active limit.
    pub fn is_limited(&self, category: DataCategory) -> bool {
        self.retry_after(category).is_some()
    }

    /// Returns the longest active limit that applies to `category`.
    pub fn retry_after(&self, category: DataCategory) -> Option<RetryAfter> {
        [RateLimitCategory::All, RateLimitCategory::Category(category)]
            .iter()
            .filter_map(|key| self.limits.get(key))
            .filter(|retry_after| !retry_after.expired())
            .max()
            .copied()
    }

    /// Removes expired limits.
    pub fn clean_expired(&mut self) {
        self.limits.retain(|_, retry_after| !retry_after.expired());
    }

    /// Returns `true` if there are no limits.
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    /// Returns the number of categories with a deadline.
    pub fn len(&self) -> usize {
        self.limits.len()
    }

    /// Iterates all limits in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (RateLimitCategory, RetryAfter)> + '_ {
        self.limits.iter().map(|(k, v)| (*k, *v))
    }
}

/// Parses the `X-Sentry-Rate-Limits` header.
///
/// The header is a comma separated list of `retry_after:categories:scope:reason_code`, where
/// categories are separated by `;`. An empty category list limits all categories. Limits with an
/// invalid delay are skipped, and so are category names this client does not know.
pub fn parse_rate_limits(string: &str) -> RateLimits {
    let mut rate_limits = RateLimits::new();

    for limit in string.split(',') {
        let limit = limit.trim();
        if limit.is_empty() {
            continue;
        }

        let mut components = limit.split(':');

        let retry_after = match components.next().and_then(|s| s.trim().parse().ok()) {
            Some(retry_after) => retry_after,
            None => continue,
        };

        let categories = components.next().unwrap_or("");
        if categories.is_empty() {
            rate_limits.add(RateLimitCategory::All, retry_after);
            continue;
        }

        for name in categories.split(';') {
            match DataCategory::from_name(name) {
                DataCategory::Unknown => {
                    beacon_log::trace!("ignoring rate limit for unknown category {name}");
                }
                category => rate_limits.add(RateLimitCategory::Category(category), retry_after),
            }
        }
    }

    rate_limits
}

/// Formats rate limits in the `X-Sentry-Rate-Limits` header format, sorted by category.
pub fn format_rate_limits(rate_limits: &RateLimits) -> String {
    let mut limits: Vec<_> = rate_limits.iter().collect();
    limits.sort_by_key(|(category, _)| *category);

    let mut header = String::new();
    for (category, retry_after) in limits {
        if !header.is_empty() {
            header.push_str(", ");
        }

        write!(header, "{}:{category}", retry_after.remaining_seconds()).ok();
    }

    header
}
