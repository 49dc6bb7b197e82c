//! Delivery of envelopes to the collector.
//!
//! The [`Transport`] turns events into [`Envelope`]s, reduces oversized payloads, drops items
//! that are currently rate limited and performs the HTTP exchange through an [`Upstream`]. All
//! data it drops is recorded in the shared [`ClientReportAggregator`].

use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use beacon_common::{DataCategory, Dsn};
use beacon_config::{HttpEncoding, Options};
use beacon_log::ErrorChain;
use beacon_protocol::{ClientSdkInfo, DiscardReason, Event, EventId, EventType, LogEvent};
use beacon_quotas::{RATE_LIMITS_HEADER, RateLimiter, ResponseRateLimits};
use bytes::Bytes;
use chrono::Utc;
use flate2::Compression;
use flate2::write::GzEncoder;
use itertools::Itertools;
use serde_json::Value;

use crate::client_report::ClientReportAggregator;
use crate::constants::{
    AUTH_HEADER, ENVELOPE_CONTENT_TYPE, ERROR_HEADER, GZIP_THRESHOLD, PROTOCOL_VERSION,
    STACKTRACE_FRAME_LIMIT_ON_OVERSIZE,
};
use crate::envelope::{Envelope, EnvelopeError, EnvelopeHeaders, Item, ItemType, Items};

mod http;

pub use self::http::*;

/// A delivery failure caused by the network or the collector.
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    /// The request did not complete, for instance because the connection was refused.
    #[error("could not send request to the collector")]
    Network(#[source] Box<dyn Error + Send + Sync>),

    /// The collector answered with a status code other than 2XX or 429.
    #[error("the server responded with status {status}{}", format_detail(.detail))]
    Response {
        /// The HTTP status code.
        status: u16,
        /// The value of the `X-Sentry-Error` header.
        detail: Option<String>,
        /// The response body.
        body: String,
    },
}

/// Errors while delivering an envelope.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Delivery failed because of the network or the collector.
    #[error(transparent)]
    External(#[from] ExternalError),

    /// Any other failure, propagated unchanged.
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
}

impl TransportError {
    /// Wraps an unclassified error.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::Other(error.into())
    }

    /// Returns `true` if the error was caused by the network or the collector.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

fn format_detail(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(" error in headers is: {detail}"),
        None => String::new(),
    }
}

impl From<EnvelopeError> for TransportError {
    fn from(error: EnvelopeError) -> Self {
        Self::other(error)
    }
}

/// A request to the envelope endpoint.
#[derive(Clone, Debug)]
pub struct UpstreamRequest {
    /// Full URL of the envelope endpoint.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(&'static str, String)>,
    /// The serialized and possibly compressed envelope.
    pub body: Vec<u8>,
}

/// A response of the collector.
#[derive(Clone, Debug, Default)]
pub struct UpstreamResponse {
    /// The HTTP status code.
    pub status: u16,
    /// Response headers in the order they were received.
    pub headers: Vec<(String, String)>,
    /// The response body.
    pub body: String,
}

impl UpstreamResponse {
    /// Creates a response with a status code and no headers.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Adds a header to the response.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns `true` for 2XX status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns all values of a header joined with `, `, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        let mut values = self
            .headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .peekable();

        values.peek()?;
        Some(values.join(", "))
    }
}

/// Performs the HTTP exchange with the collector.
///
/// Implementations must classify connectivity failures as [`ExternalError::Network`] and return
/// every response, including error responses, as [`UpstreamResponse`].
pub trait Upstream: fmt::Debug + Send + Sync {
    /// Sends a single request and waits for the response.
    fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}

/// An item rejected because it did not fit into its size limit.
#[derive(Clone, Debug, PartialEq)]
pub struct OversizedItem {
    /// The type of the rejected item.
    pub ty: ItemType,
    /// Serialized size after all reductions.
    pub size: usize,
    /// Approximate size per top-level attribute, formatted as `{tags: 2, extra: 2}`.
    pub breakdown: Option<String>,
}

/// The wire form of an envelope.
#[derive(Debug)]
pub struct SerializedEnvelope {
    /// The event id from the envelope headers.
    pub event_id: Option<EventId>,
    /// The serialized envelope, or `None` if no item is left to send.
    pub body: Option<Vec<u8>>,
    /// Types of the items contained in `body`, in order.
    pub items: Vec<ItemType>,
    /// Items excluded because they exceeded their size limit.
    pub oversized: Vec<OversizedItem>,
}

/// Sends envelopes to the collector identified by a [`Dsn`].
#[derive(Debug)]
pub struct Transport {
    dsn: Dsn,
    encoding: HttpEncoding,
    sdk: ClientSdkInfo,
    upstream: Arc<dyn Upstream>,
    rate_limiter: RateLimiter,
    client_reports: ClientReportAggregator,
    debug: bool,
}

impl Transport {
    /// Creates a transport that sends through the given upstream.
    pub fn new(dsn: Dsn, options: &Options, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            dsn,
            encoding: options.transport.encoding,
            sdk: ClientSdkInfo::beacon(),
            upstream,
            rate_limiter: RateLimiter::new(),
            client_reports: ClientReportAggregator::new(options.send_client_reports),
            debug: options.debug,
        }
    }

    /// Creates a transport that sends over HTTP.
    pub fn http(dsn: Dsn, options: &Options) -> Result<Self, TransportError> {
        let upstream = HttpUpstream::new(&dsn, &options.transport)?;
        Ok(Self::new(dsn, options, Arc::new(upstream)))
    }

    /// Returns the destination of this transport.
    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    /// Returns the rate limits received from the collector.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Returns `true` if error logs include the causes of failures.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Returns the aggregator of discarded data.
    pub fn client_reports(&self) -> &ClientReportAggregator {
        &self.client_reports
    }

    /// Records a discarded event and, for transactions, its spans.
    pub fn record_lost_event(&self, reason: DiscardReason, category: DataCategory, spans: usize) {
        self.client_reports.record(reason, category, 1);
        self.client_reports
            .record(reason, DataCategory::Span, spans as u64);
    }

    /// Creates envelope headers for this destination.
    fn envelope_headers(&self, event_id: Option<EventId>) -> EnvelopeHeaders {
        EnvelopeHeaders {
            event_id,
            dsn: Some(self.dsn.clone()),
            sdk: Some(self.sdk.clone()),
            sent_at: Some(Utc::now()),
            trace: None,
        }
    }

    /// Appends a client report item if any data has been discarded.
    fn add_client_report(&self, envelope: &mut Envelope) -> Result<(), TransportError> {
        if let Some(report) = self.client_reports.drain_report() {
            envelope.add_item(Item::client_report(&report)?);
        }
        Ok(())
    }

    /// Serializes an event into its JSON payload, logging failures.
    pub fn event_to_json(&self, event: &Event) -> Result<Value, serde_json::Error> {
        event.to_json().inspect_err(|error| {
            beacon_log::error!(
                "converting event ({}) to json failed: {}",
                event.event_id().map(|id| id.to_string()).unwrap_or_default(),
                ErrorChain(error, self.debug)
            );
        })
    }

    /// Builds the envelope for an event.
    ///
    /// The envelope holds the event item, one item per attachment, the profile of a transaction
    /// and the pending client report, in this order.
    pub fn envelope_from_event(&self, event: &Event) -> Result<Envelope, TransportError> {
        let event_id = event.event_id();
        let payload = self.event_to_json(event).map_err(TransportError::other)?;

        let mut headers = self.envelope_headers(event_id);
        headers.trace = event.dynamic_sampling_context().cloned();

        let mut envelope = Envelope::new(headers);
        envelope.add_item(Item::from_json(item_type(event.event_type()), payload));

        for attachment in event.attachments() {
            let payload = match attachment.payload() {
                Ok(payload) => payload,
                Err(error) => {
                    beacon_log::warn!(
                        error = &error as &dyn Error,
                        filename = %attachment.filename,
                        "failed to read attachment"
                    );
                    continue;
                }
            };

            match Item::attachment(attachment, payload) {
                Ok(item) => envelope.add_item(item),
                Err(error) => beacon_log::warn!(
                    error = &error as &dyn Error,
                    filename = %attachment.filename,
                    "dropping attachment that does not fit into an item"
                ),
            }
        }

        if let Some(profile) = event.profile() {
            envelope.add_item(Item::profile(profile.clone()));
        }

        self.add_client_report(&mut envelope)?;
        Ok(envelope)
    }

    /// Builds a single envelope for a batch of log records.
    pub fn envelope_from_logs(&self, logs: &[LogEvent]) -> Result<Envelope, TransportError> {
        let mut envelope = Envelope::new(self.envelope_headers(None));
        envelope.add_item(Item::logs(logs)?);
        Ok(envelope)
    }

    /// Serializes an envelope, reducing or rejecting items that exceed their size limit.
    ///
    /// Oversized events and transactions first lose their breadcrumbs, then the middle of long
    /// stack traces. Items that still do not fit are excluded from the envelope. Other items are
    /// not affected by a rejection.
    pub fn serialize_envelope(
        &self,
        envelope: Envelope,
    ) -> Result<SerializedEnvelope, TransportError> {
        let (headers, items) = envelope.into_parts();
        let event_id = headers.event_id;

        let mut kept = Items::new();
        let mut oversized = Vec::new();

        for mut item in items {
            match fit_item(&mut item)? {
                None => kept.push(item),
                Some(rejected) => oversized.push(rejected),
            }
        }

        let item_types = kept.iter().map(|item| item.ty().clone()).collect();
        let body = if kept.is_empty() {
            None
        } else {
            Some(Envelope::from_parts(headers, kept).to_vec()?)
        };

        Ok(SerializedEnvelope {
            event_id,
            body,
            items: item_types,
            oversized,
        })
    }

    /// Sends an envelope.
    ///
    /// Items whose category is rate limited are dropped before sending. If no item is left, no
    /// request is made.
    pub fn send_envelope(&self, mut envelope: Envelope) -> Result<(), TransportError> {
        envelope.retain_items(|item| {
            let category = item.data_category();
            if !self.rate_limiter.is_limited(category) {
                return true;
            }

            // A dropped client report cannot report itself.
            if category == DataCategory::Internal {
                beacon_log::debug!("dropping client report because of rate limits");
                return false;
            }

            let quantity = item.item_count().unwrap_or(1);
            self.client_reports.record(
                DiscardReason::RatelimitBackoff,
                category,
                u64::from(quantity),
            );
            self.client_reports.record(
                DiscardReason::RatelimitBackoff,
                DataCategory::Span,
                item.span_count() as u64,
            );
            false
        });

        if envelope.is_empty() {
            beacon_log::debug!("envelope not sent because all items are rate limited");
            return Ok(());
        }

        let serialized = self.serialize_envelope(envelope)?;
        let Some(body) = serialized.body else {
            return Ok(());
        };

        beacon_log::debug!(
            "sending envelope with items [{}] {}",
            serialized.items.iter().join(", "),
            serialized
                .event_id
                .map(|id| id.to_string())
                .unwrap_or_default()
        );

        let mut headers = vec![
            ("Content-Type", ENVELOPE_CONTENT_TYPE.to_owned()),
            (AUTH_HEADER, self.auth_header()),
            ("User-Agent", self.sdk.client_name()),
        ];

        let body = match self.encoding.name() {
            Some(name) if body.len() >= GZIP_THRESHOLD => {
                headers.push(("Content-Encoding", name.to_owned()));
                encode_payload(&body, self.encoding).map_err(TransportError::other)?
            }
            _ => body,
        };

        let response = self.upstream.send(UpstreamRequest {
            url: self.dsn.envelope_url(),
            headers,
            body,
        })?;

        self.handle_response(response)
    }

    /// Sends an event with its attachments and the pending client report.
    pub fn send_event(&self, event: &Event) -> Result<(), TransportError> {
        let envelope = self.envelope_from_event(event)?;
        self.send_envelope(envelope)
    }

    /// Sends the pending client report, if any data has been discarded.
    pub fn flush(&self) -> Result<(), TransportError> {
        if self.client_reports.is_empty() {
            return Ok(());
        }

        let mut envelope = Envelope::new(self.envelope_headers(None));
        self.add_client_report(&mut envelope)?;
        if envelope.is_empty() {
            return Ok(());
        }

        self.send_envelope(envelope)
    }

    /// Returns the value of the authentication header.
    fn auth_header(&self) -> String {
        let mut header = format!(
            "Sentry sentry_version={PROTOCOL_VERSION}, sentry_client={}, sentry_timestamp={}, sentry_key={}",
            self.sdk.client_name(),
            Utc::now().timestamp(),
            self.dsn.public_key(),
        );

        if let Some(secret_key) = self.dsn.secret_key() {
            header.push_str(", sentry_secret=");
            header.push_str(secret_key);
        }

        header
    }

    /// Applies rate limits of a response and turns error responses into errors.
    ///
    /// Rate limit headers are honored on successful responses too. A `429` response is not an
    /// error, its signals only update the rate limiter.
    fn handle_response(&self, response: UpstreamResponse) -> Result<(), TransportError> {
        let too_many_requests = response.status == 429;

        if response.is_success() || too_many_requests {
            let rate_limits = ResponseRateLimits::new(too_many_requests)
                .retry_after(response.header("Retry-After").as_deref())
                .rate_limits(response.header(RATE_LIMITS_HEADER).as_deref());

            self.rate_limiter.update(rate_limits.into_rate_limits());
            return Ok(());
        }

        Err(ExternalError::Response {
            status: response.status,
            detail: response.header(ERROR_HEADER),
            body: response.body,
        }
        .into())
    }
}

/// Returns the item type an event is sent in.
fn item_type(event_type: EventType) -> ItemType {
    match event_type {
        EventType::Error => ItemType::Event,
        EventType::Transaction => ItemType::Transaction,
        EventType::CheckIn => ItemType::CheckIn,
    }
}

fn encode_payload(body: &[u8], http_encoding: HttpEncoding) -> Result<Vec<u8>, io::Error> {
    match http_encoding {
        HttpEncoding::Identity => Ok(body.to_vec()),
        HttpEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body)?;
            encoder.finish()
        }
    }
}

/// Ensures the item fits into its size limit.
///
/// Returns the rejection if the item cannot be reduced below the limit.
fn fit_item(item: &mut Item) -> Result<Option<OversizedItem>, EnvelopeError> {
    let max_size = item.ty().max_payload_size();
    let payload = item.payload_bytes()?;
    if payload.len() <= max_size {
        return Ok(None);
    }

    let reducible = item.ty().is_reducible();
    let Some(mut json) = item.json().filter(|_| reducible).cloned() else {
        beacon_log::debug!(
            "envelope item [{}] exceeds the maximum size of {max_size} bytes",
            item.ty()
        );
        return Ok(Some(OversizedItem {
            ty: item.ty().clone(),
            size: payload.len(),
            breakdown: None,
        }));
    };

    let mut size = payload.len();
    for reduce in [remove_breadcrumbs as fn(&mut Value) -> bool, trim_frames] {
        if !reduce(&mut json) {
            continue;
        }

        let reduced = serde_json::to_vec(&json).map_err(EnvelopeError::InvalidPayload)?;
        size = reduced.len();
        if size <= max_size {
            item.set_payload_bytes(Bytes::from(reduced))?;
            return Ok(None);
        }
    }

    let breakdown = size_breakdown(&json);
    beacon_log::debug!(
        "envelope item [{}] is still oversized after size reduction: {breakdown}",
        item.ty()
    );

    Ok(Some(OversizedItem {
        ty: item.ty().clone(),
        size,
        breakdown: Some(breakdown),
    }))
}

/// Removes all breadcrumbs. Returns `true` if there were any.
fn remove_breadcrumbs(payload: &mut Value) -> bool {
    payload
        .as_object_mut()
        .and_then(|object| object.remove("breadcrumbs"))
        .is_some()
}

/// Keeps the outermost frames of long stack traces. Returns `true` if any frame was removed.
fn trim_frames(payload: &mut Value) -> bool {
    let half = STACKTRACE_FRAME_LIMIT_ON_OVERSIZE / 2;
    let mut trimmed = false;

    for pointer in ["/exception/values", "/threads/values"] {
        let Some(values) = payload.pointer_mut(pointer).and_then(Value::as_array_mut) else {
            continue;
        };

        for value in values {
            let Some(frames) = value
                .pointer_mut("/stacktrace/frames")
                .and_then(Value::as_array_mut)
            else {
                continue;
            };

            if frames.len() > STACKTRACE_FRAME_LIMIT_ON_OVERSIZE {
                let end = frames.len() - half;
                frames.drain(half..end);
                trimmed = true;
            }
        }
    }

    trimmed
}

/// Formats the serialized size of every top-level attribute.
fn size_breakdown(payload: &Value) -> String {
    let Some(object) = payload.as_object() else {
        return "{}".to_owned();
    };

    let sizes = object
        .iter()
        .map(|(key, value)| {
            let size = serde_json::to_vec(value).map_or(0, |bytes| bytes.len());
            format!("{key}: {size}")
        })
        .join(", ");

    format!("{{{sizes}}}")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Read;

    use beacon_protocol::{
        Attachment, Breadcrumb, ErrorEvent, Exception, Frame, Span, Stacktrace, TransactionEvent,
    };
    use beacon_quotas::{DEFAULT_RETRY_AFTER_SECS, MAX_RETRY_AFTER_SECS, parse_rate_limits};
    use flate2::read::GzDecoder;

    use super::*;
    use crate::constants::MAX_EVENT_SIZE;
    use crate::testutils::{RecordingUpstream, test_options, test_transport};

    fn big_string(len: usize) -> String {
        "x".repeat(len)
    }

    fn event_with_breadcrumbs() -> Event {
        let mut event = ErrorEvent::from_message("too many breadcrumbs");
        for _ in 0..100 {
            event
                .base
                .breadcrumbs
                .record(Breadcrumb::new(big_string(10_240)));
        }
        event.into()
    }

    fn frames(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|index| Frame {
                function: Some(format!("function_{index}")),
                context_line: Some(big_string(1_500)),
                ..Frame::default()
            })
            .collect()
    }

    #[test]
    fn test_envelope_from_event_items() {
        let (transport, _) = test_transport();

        let mut event = ErrorEvent::from_message("with attachment");
        event
            .base
            .attachments
            .push(Attachment::from_bytes("hello.txt", "hello"));
        event
            .base
            .attachments
            .push(Attachment::from_path("/nonexistent/beacon/attachment.txt"));

        let envelope = transport.envelope_from_event(&event.into()).unwrap();
        assert_eq!(envelope.item_types(), "event, attachment");
        assert!(envelope.event_id().is_some());
        assert!(envelope.headers().sent_at.is_some());
    }

    #[test]
    fn test_attachment_read_from_file() {
        let (transport, _) = test_transport();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crash.log");
        std::fs::write(&path, "line 1\nline 2\n").unwrap();

        let mut event = ErrorEvent::from_message("with file");
        event
            .base
            .attachments
            .push(Attachment::from_path(&path).with_content_type("text/plain"));

        let envelope = transport.envelope_from_event(&event.into()).unwrap();
        let item = envelope.items().nth(1).unwrap();

        similar_asserts::assert_eq!(
            (item.filename(), item.content_type(), item.len()),
            (Some("crash.log"), Some("text/plain"), Some(14))
        );
        assert_eq!(&item.payload_bytes().unwrap()[..], b"line 1\nline 2\n");
    }

    #[test]
    fn test_envelope_from_transaction_with_profile() {
        let (transport, _) = test_transport();

        let mut root = Span::root("http.server");
        root.finish();
        let mut transaction = TransactionEvent::new("GET /", root);
        transaction.profile = Some(serde_json::json!({"samples": []}));
        transaction.base.dynamic_sampling_context =
            Some(BTreeMap::from([("sample_rate".to_owned(), "1.0".to_owned())]));

        let envelope = transport.envelope_from_event(&transaction.into()).unwrap();
        assert_eq!(envelope.item_types(), "transaction, profile");
        assert_eq!(
            envelope.headers().trace.as_ref().unwrap()["sample_rate"],
            "1.0"
        );
    }

    #[test]
    fn test_envelope_attaches_and_drains_client_report() {
        let (transport, _) = test_transport();
        transport.record_lost_event(DiscardReason::QueueOverflow, DataCategory::Error, 0);

        let event: Event = ErrorEvent::from_message("hello").into();
        let envelope = transport.envelope_from_event(&event).unwrap();
        assert_eq!(envelope.item_types(), "event, client_report");
        assert!(transport.client_reports().is_empty());

        let envelope = transport.envelope_from_event(&event).unwrap();
        assert_eq!(envelope.item_types(), "event");
    }

    #[test]
    fn test_serialize_removes_breadcrumbs() {
        beacon_log::init_test!();
        let (transport, _) = test_transport();

        let envelope = transport
            .envelope_from_event(&event_with_breadcrumbs())
            .unwrap();
        let serialized = transport.serialize_envelope(envelope).unwrap();

        assert_eq!(serialized.items, [ItemType::Event]);
        assert!(serialized.oversized.is_empty());

        let body = serialized.body.unwrap();
        let parsed = Envelope::parse_bytes(body.into()).unwrap();
        let item = parsed.items().next().unwrap();
        let payload = item.payload_bytes().unwrap();
        assert!(payload.len() <= MAX_EVENT_SIZE);

        let json: Value = serde_json::from_slice(&payload).unwrap();
        assert!(json.get("breadcrumbs").is_none());
        assert_eq!(json["message"], "too many breadcrumbs");
    }

    #[test]
    fn test_serialize_trims_frames() {
        beacon_log::init_test!();
        let (transport, _) = test_transport();

        let exception = Exception {
            ty: "RuntimeError".to_owned(),
            value: Some("deep recursion".to_owned()),
            stacktrace: Some(Stacktrace {
                frames: frames(1_000),
            }),
            ..Exception::default()
        };
        let event = ErrorEvent::from_exceptions(vec![exception]);

        let envelope = transport.envelope_from_event(&event.into()).unwrap();
        let serialized = transport.serialize_envelope(envelope).unwrap();
        assert_eq!(serialized.items, [ItemType::Event]);

        let parsed = Envelope::parse_bytes(serialized.body.unwrap().into()).unwrap();
        let payload = parsed.items().next().unwrap().payload_bytes().unwrap();
        let json: Value = serde_json::from_slice(&payload).unwrap();

        let frames = json["exception"]["values"][0]["stacktrace"]["frames"]
            .as_array()
            .unwrap();
        assert_eq!(frames.len(), STACKTRACE_FRAME_LIMIT_ON_OVERSIZE);
        assert_eq!(frames[0]["function"], "function_0");
        assert_eq!(frames[249]["function"], "function_249");
        assert_eq!(frames[250]["function"], "function_750");
        assert_eq!(frames[499]["function"], "function_999");
    }

    #[test]
    fn test_serialize_rejects_oversized_contexts() {
        beacon_log::init_test!();
        let (transport, _) = test_transport();

        let mut event = ErrorEvent::from_message("huge contexts");
        for index in 0..1_000 {
            event
                .base
                .contexts
                .insert(format!("context_{index}"), Value::String(big_string(8_192)));
        }
        for _ in 0..10 {
            event.base.breadcrumbs.record(Breadcrumb::new("crumb"));
        }

        let mut envelope = transport.envelope_from_event(&event.into()).unwrap();
        envelope.add_item(Item::statsd("endpoint.hits:1|c").unwrap());

        let serialized = transport.serialize_envelope(envelope).unwrap();
        assert_eq!(serialized.items, [ItemType::Statsd]);
        assert_eq!(serialized.oversized.len(), 1);

        let rejected = &serialized.oversized[0];
        assert_eq!(rejected.ty, ItemType::Event);
        assert!(rejected.size > MAX_EVENT_SIZE);

        let breakdown = rejected.breakdown.as_deref().unwrap();
        assert!(breakdown.contains("tags: 2"));
        assert!(breakdown.contains("extra: 2"));
        assert!(breakdown.contains("contexts: "));
        assert!(!breakdown.contains("breadcrumbs"));
    }

    #[test]
    fn test_serialize_rejects_oversized_attachment_without_trimming() {
        let (transport, _) = test_transport();

        let mut envelope = Envelope::new(EnvelopeHeaders::default());
        let attachment = Attachment::from_bytes("huge.bin", vec![0u8; 100_000_001]);
        envelope.add_item(Item::attachment(&attachment, attachment.payload().unwrap()).unwrap());

        let serialized = transport.serialize_envelope(envelope).unwrap();
        assert!(serialized.body.is_none());
        assert!(serialized.items.is_empty());
        assert_eq!(serialized.oversized[0].breakdown, None);
    }

    #[test]
    fn test_statsd_payload_is_verbatim() {
        let (transport, _) = test_transport();

        let mut envelope = Envelope::new(EnvelopeHeaders::default());
        envelope.add_item(Item::statsd("endpoint.hits:1|c\nendpoint.duration:2|ms").unwrap());

        let body = transport.serialize_envelope(envelope).unwrap().body.unwrap();
        insta::assert_snapshot!(String::from_utf8(body).unwrap(), @r#"
        {}
        {"type":"statsd","length":40}
        endpoint.hits:1|c
        endpoint.duration:2|ms
        "#);
    }

    #[test]
    fn test_send_event_request() {
        let (transport, upstream) = test_transport();

        let event: Event = ErrorEvent::from_message("hello").into();
        transport.send_event(&event).unwrap();

        let requests = upstream.requests();
        assert_eq!(requests.len(), 1);

        let request = &requests[0];
        assert_eq!(
            request.url,
            "http://sentry.localdomain:80/sentry/api/42/envelope/"
        );

        let headers: BTreeMap<_, _> = request.headers.iter().cloned().collect();
        assert_eq!(headers["Content-Type"], "application/x-sentry-envelope");
        assert_eq!(headers["User-Agent"], ClientSdkInfo::beacon().client_name());
        assert!(!headers.contains_key("Content-Encoding"));

        let auth = &headers["X-Sentry-Auth"];
        assert!(auth.starts_with("Sentry sentry_version=7, sentry_client=beacon/"));
        assert!(auth.contains("sentry_timestamp="));
        assert!(auth.ends_with("sentry_key=12345, sentry_secret=67890"));

        let envelopes = upstream.envelopes();
        assert_eq!(envelopes[0].item_types(), "event");
        assert_eq!(envelopes[0].event_id(), event.event_id());
    }

    #[test]
    fn test_auth_header_without_secret() {
        let options = test_options();
        let dsn: Dsn = "http://12345@sentry.localdomain/42".parse().unwrap();
        let transport = Transport::new(dsn, &options, Arc::new(RecordingUpstream::new()));

        assert!(transport.auth_header().ends_with(", sentry_key=12345"));
    }

    #[test]
    fn test_gzip_above_threshold() {
        let (transport, upstream) = test_transport();

        let mut event = ErrorEvent::from_message("large");
        event
            .base
            .extra
            .insert("blob".to_owned(), Value::String(big_string(GZIP_THRESHOLD)));
        transport.send_event(&event.into()).unwrap();

        let requests = upstream.requests();
        let headers: BTreeMap<_, _> = requests[0].headers.iter().cloned().collect();
        assert_eq!(headers["Content-Encoding"], "gzip");

        let mut decoded = Vec::new();
        GzDecoder::new(requests[0].body.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert!(decoded.len() > GZIP_THRESHOLD);
        assert_eq!(upstream.envelopes()[0].item_types(), "event");
    }

    #[test]
    fn test_identity_encoding_never_compresses() {
        let mut options = test_options();
        options.transport.encoding = HttpEncoding::Identity;
        let upstream = Arc::new(RecordingUpstream::new());
        let transport = Transport::new(
            options.dsn.clone().unwrap(),
            &options,
            upstream.clone(),
        );

        let mut event = ErrorEvent::from_message("large");
        event
            .base
            .extra
            .insert("blob".to_owned(), Value::String(big_string(GZIP_THRESHOLD)));
        transport.send_event(&event.into()).unwrap();

        let requests = upstream.requests();
        assert!(requests[0].headers.iter().all(|(name, _)| *name != "Content-Encoding"));
    }

    #[test]
    fn test_rate_limited_items_are_dropped() {
        beacon_log::init_test!();
        let (transport, upstream) = test_transport();
        transport
            .rate_limiter()
            .update(Some(parse_rate_limits("60:transaction")));

        let root = Span::root("task");
        let mut transaction = TransactionEvent::new("task", root.clone());
        for _ in 0..2 {
            let mut child = root.child("db");
            child.finish();
            transaction.spans.push(child);
        }

        transport.send_event(&transaction.into()).unwrap();
        assert!(upstream.requests().is_empty());

        let counts = transport.client_reports().snapshot();
        assert_eq!(
            counts[&(DiscardReason::RatelimitBackoff, DataCategory::Transaction)],
            1
        );
        assert_eq!(
            counts[&(DiscardReason::RatelimitBackoff, DataCategory::Span)],
            3
        );

        // Errors are not affected by the transaction limit.
        transport
            .send_event(&ErrorEvent::from_message("error").into())
            .unwrap();
        let envelopes = upstream.envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].item_types(), "event, client_report");
    }

    #[test]
    fn test_wildcard_limit_drops_client_report() {
        let (transport, upstream) = test_transport();
        transport
            .rate_limiter()
            .update(Some(parse_rate_limits("60::organization")));

        transport
            .send_event(&ErrorEvent::from_message("error").into())
            .unwrap();
        assert!(upstream.requests().is_empty());
        assert!(!transport.client_reports().is_empty());

        // The report is limited like every other item and is not recorded again.
        transport.flush().unwrap();
        assert!(upstream.requests().is_empty());
        assert!(transport.client_reports().is_empty());
    }

    #[test]
    fn test_huge_rate_limit_is_capped() {
        let (transport, upstream) = test_transport();
        upstream.respond_with(
            UpstreamResponse::new(200).with_header("X-Sentry-Rate-Limits", "1e20:error"),
        );

        transport
            .send_event(&ErrorEvent::from_message("hello").into())
            .unwrap();

        let retry_after = transport
            .rate_limiter()
            .current()
            .retry_after(DataCategory::Error)
            .unwrap();
        assert_eq!(retry_after.remaining_seconds(), MAX_RETRY_AFTER_SECS);
    }

    #[test]
    fn test_non_finite_retry_after_uses_default() {
        let (transport, upstream) = test_transport();
        upstream.respond_with(UpstreamResponse::new(429).with_header("Retry-After", "inf"));

        transport
            .send_event(&ErrorEvent::from_message("hello").into())
            .unwrap();

        let retry_after = transport
            .rate_limiter()
            .current()
            .retry_after(DataCategory::Transaction)
            .unwrap();
        assert_eq!(retry_after.remaining_seconds(), DEFAULT_RETRY_AFTER_SECS);
    }

    #[test]
    fn test_response_rate_limits_on_success() {
        let (transport, upstream) = test_transport();
        upstream.respond_with(
            UpstreamResponse::new(200).with_header("x-sentry-rate-limits", "60:error;transaction"),
        );

        transport
            .send_event(&ErrorEvent::from_message("error").into())
            .unwrap();

        assert!(transport.rate_limiter().is_limited(DataCategory::Error));
        assert!(transport.rate_limiter().is_limited(DataCategory::Transaction));
        assert!(!transport.rate_limiter().is_limited(DataCategory::Attachment));
    }

    #[test]
    fn test_too_many_requests_limits_all() {
        let (transport, upstream) = test_transport();
        upstream.respond_with(UpstreamResponse::new(429).with_header("Retry-After", "30"));

        transport
            .send_event(&ErrorEvent::from_message("error").into())
            .unwrap();

        let limits = transport.rate_limiter().current();
        let retry_after = limits.retry_after(DataCategory::Monitor).unwrap();
        assert!(retry_after.remaining_seconds() <= 30);
        assert!(retry_after.remaining_seconds() >= 29);
    }

    #[test]
    fn test_error_response_with_detail() {
        let (transport, upstream) = test_transport();
        upstream.respond_with(
            UpstreamResponse::new(500).with_header("X-Sentry-Error", "project not found"),
        );

        let error = transport
            .send_event(&ErrorEvent::from_message("error").into())
            .unwrap_err();

        assert!(error.is_external());
        insta::assert_snapshot!(error.to_string(), @"the server responded with status 500 error in headers is: project not found");
    }

    #[test]
    fn test_error_response_without_detail() {
        let (transport, upstream) = test_transport();
        upstream.respond_with(UpstreamResponse::new(400));

        let error = transport
            .send_event(&ErrorEvent::from_message("error").into())
            .unwrap_err();
        assert_eq!(error.to_string(), "the server responded with status 400");
    }

    #[test]
    fn test_flush_only_with_pending_reports() {
        let (transport, upstream) = test_transport();

        transport.flush().unwrap();
        assert!(upstream.requests().is_empty());

        transport.record_lost_event(DiscardReason::SampleRate, DataCategory::Error, 0);
        transport.flush().unwrap();

        let envelopes = upstream.envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].item_types(), "client_report");
        assert_eq!(envelopes[0].event_id(), None);
        assert!(transport.client_reports().is_empty());
    }

    #[test]
    fn test_multiple_header_values_are_joined() {
        let response = UpstreamResponse::new(200)
            .with_header("X-Sentry-Rate-Limits", "60:error")
            .with_header("x-sentry-rate-limits", "30:transaction");

        assert_eq!(
            response.header(RATE_LIMITS_HEADER).as_deref(),
            Some("60:error, 30:transaction")
        );
        assert_eq!(response.header("Retry-After"), None);
    }

    #[test]
    fn test_raw_event_sent_verbatim() {
        let (transport, upstream) = test_transport();

        let mut raw = serde_json::Map::new();
        raw.insert("message".to_owned(), "legacy".into());
        transport.send_event(&Event::Raw(raw)).unwrap();

        let envelopes = upstream.envelopes();
        let item = envelopes[0].items().next().unwrap();
        assert_eq!(item.ty(), &ItemType::Event);

        let json: Value = serde_json::from_slice(&item.payload_bytes().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"message": "legacy"}));
    }
}
