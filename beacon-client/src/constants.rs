/// Version of the envelope protocol spoken by this client.
pub const PROTOCOL_VERSION: u8 = 7;

/// Content type of envelope request bodies.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/x-sentry-envelope";

/// Content type of batched log items.
pub const LOG_CONTAINER_CONTENT_TYPE: &str = "application/vnd.sentry.items.log+json";

/// Content type of JSON item payloads.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Header carrying the authentication of envelope requests.
pub const AUTH_HEADER: &str = "X-Sentry-Auth";

/// Response header carrying a human readable rejection reason.
pub const ERROR_HEADER: &str = "X-Sentry-Error";

/// Maximum payload size of event, transaction, check-in and log items.
pub const MAX_EVENT_SIZE: usize = 1_000_000;

/// Maximum payload size of profile items.
pub const MAX_PROFILE_SIZE: usize = 50_000_000;

/// Maximum payload size of attachment items.
pub const MAX_ATTACHMENT_SIZE: usize = 100_000_000;

/// Number of stack frames kept when an oversized event is reduced.
///
/// Half of the frames are kept from the start of the stack trace and half from its end.
pub const STACKTRACE_FRAME_LIMIT_ON_OVERSIZE: usize = 500;

/// Request bodies of at least this size are compressed.
pub const GZIP_THRESHOLD: usize = 30 * 1024;
