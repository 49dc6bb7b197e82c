//! Rate limits directed by the collector.
//!
//! The collector signals backoff through the `X-Sentry-Rate-Limits` header, or through a `429`
//! status code with an optional `Retry-After` header. [`ResponseRateLimits`] extracts these signals
//! from a response and the shared [`RateLimiter`] remembers them until they expire:
//!
//! ```
//! use beacon_common::DataCategory;
//! use beacon_quotas::{RateLimiter, ResponseRateLimits};
//!
//! let limiter = RateLimiter::new();
//! let signals = ResponseRateLimits::new(false).rate_limits(Some("60:transaction:key"));
//! limiter.update(signals.into_rate_limits());
//!
//! assert!(limiter.is_limited(DataCategory::Transaction));
//! assert!(!limiter.is_limited(DataCategory::Error));
//! ```

#![warn(missing_docs)]

mod rate_limit;
mod rate_limiter;

pub use self::rate_limit::*;
pub use self::rate_limiter::*;

/// Name of the rate limits header.
pub const RATE_LIMITS_HEADER: &str = "X-Sentry-Rate-Limits";

/// Backoff applied to all categories when a `429` response carries no usable retry hint.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Upper bound for any backoff requested by the collector.
pub const MAX_RETRY_AFTER_SECS: u64 = 24 * 60 * 60;
