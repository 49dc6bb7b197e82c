//! Implementation of event envelopes.
//!
//! Envelopes are containers for payloads related to events. Similar to multipart form data
//! requests, each envelope has global headers and a set of items, such as the event payload, an
//! attachment, or a client report.
//!
//! Envelopes have a well-defined serialization format. It is roughly:
//!
//! ```plain
//! <json headers>\n
//! <item headers>\n
//! payload\n
//! ...
//! ```
//!
//! JSON headers and item headers must not contain line breaks. Payloads can be any binary encoding.
//! This is enabled by declaring an explicit length in the item headers. Example:
//!
//! ```plain
//! {"event_id":"9ec79c33ec9942ab8353589fcb2e04dc","dsn":"https://e12d836b15bb49d7bbf99e64295d995b@sentry.io/42"}
//! {"type":"event","content_type":"application/json"}
//! {"message":"hello world","level":"error"}
//! {"type":"attachment","length":7,"filename":"application.log","content_type":"text/plain"}
//! Hello
//!
//! ```
//!
//! Item order is preserved when writing and parsing envelopes.

use std::io::{self, Write};

use beacon_common::Dsn;
use beacon_protocol::{ClientSdkInfo, DynamicSamplingContext, EventId};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

mod item;

pub use self::item::*;

/// Errors while writing or parsing envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The envelope ended before an item was complete.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// The envelope does not start with a header.
    #[error("missing envelope header")]
    MissingHeader,
    /// A header or payload was not followed by a newline.
    #[error("missing newline after header or payload")]
    MissingNewline,
    /// The envelope header is not valid JSON.
    #[error("invalid envelope header")]
    InvalidHeader(#[source] serde_json::Error),
    /// An item header is not valid JSON.
    #[error("invalid item header")]
    InvalidItemHeader(#[source] serde_json::Error),
    /// A JSON payload could not be serialized.
    #[error("invalid item payload")]
    InvalidPayload(#[source] serde_json::Error),
    /// Writing a header failed.
    #[error("failed to write header")]
    HeaderIoFailed(#[source] serde_json::Error),
    /// Writing a payload failed.
    #[error("failed to write payload")]
    PayloadIoFailed(#[source] io::Error),
    /// A payload is longer than an item header can declare.
    #[error("item payload of {0} bytes is too large")]
    PayloadTooLarge(usize),
    /// A container holds more records than an item header can declare.
    #[error("item with {0} records is too large")]
    TooManyRecords(usize),
}

/// Headers of an envelope, written as the first JSON line.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct EnvelopeHeaders {
    /// Unique identifier of the event associated to this envelope.
    ///
    /// Envelopes without contained events do not contain an event id. This is for instance the
    /// case for client reports and logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,

    /// The destination of the envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsn: Option<Dsn>,

    /// The client that created the envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<ClientSdkInfo>,

    /// Timestamp when the envelope has been sent.
    ///
    /// This can be used to perform drift correction.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_sent_at",
        deserialize_with = "deserialize_sent_at"
    )]
    pub sent_at: Option<DateTime<Utc>>,

    /// Trace context associated with the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<DynamicSamplingContext>,
}

fn serialize_sent_at<S>(sent_at: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match sent_at {
        Some(sent_at) => {
            serializer.serialize_str(&sent_at.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        None => serializer.serialize_none(),
    }
}

fn deserialize_sent_at<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<DateTime<Utc>>::deserialize(deserializer)
}

/// The items of an envelope.
pub type Items = SmallVec<[Item; 3]>;

/// An ordered container of items sent in a single request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    headers: EnvelopeHeaders,
    items: Items,
}

impl Envelope {
    /// Creates an envelope without items.
    pub fn new(headers: EnvelopeHeaders) -> Self {
        Self {
            headers,
            items: Items::new(),
        }
    }

    /// Creates an envelope from headers and items.
    pub fn from_parts(headers: EnvelopeHeaders, items: Items) -> Self {
        Self { headers, items }
    }

    /// Parses an envelope from bytes.
    pub fn parse_bytes(bytes: Bytes) -> Result<Self, EnvelopeError> {
        let (headers, offset) = Self::parse_headers(&bytes)?;
        let items = Self::parse_items(&bytes, offset)?;

        Ok(Self { headers, items })
    }

    /// Splits the envelope into its headers and items.
    pub fn into_parts(self) -> (EnvelopeHeaders, Items) {
        (self.headers, self.items)
    }

    /// Returns the envelope headers.
    pub fn headers(&self) -> &EnvelopeHeaders {
        &self.headers
    }

    /// Returns the number of items in this envelope.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if this envelope does not contain any items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Unique identifier of the event associated to this envelope.
    pub fn event_id(&self) -> Option<EventId> {
        self.headers.event_id
    }

    /// Returns an iterator over items in this envelope.
    pub fn items(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }

    /// Returns the item types in order, formatted as `event, attachment`.
    pub fn item_types(&self) -> String {
        self.items.iter().map(Item::ty).join(", ")
    }

    /// Adds a new item to this envelope.
    pub fn add_item(&mut self, item: Item) {
        self.items.push(item)
    }

    /// Retains only the items specified by the predicate.
    pub fn retain_items<F>(&mut self, f: F)
    where
        F: FnMut(&mut Item) -> bool,
    {
        self.items.retain(f)
    }

    /// Serializes this envelope into the given writer.
    pub fn serialize<W>(&self, mut writer: W) -> Result<(), EnvelopeError>
    where
        W: Write,
    {
        serde_json::to_writer(&mut writer, &self.headers).map_err(EnvelopeError::HeaderIoFailed)?;
        self.write(&mut writer, b"\n")?;

        for item in &self.items {
            serde_json::to_writer(&mut writer, item.headers())
                .map_err(EnvelopeError::HeaderIoFailed)?;
            self.write(&mut writer, b"\n")?;

            self.write(&mut writer, &item.payload_bytes()?)?;
            self.write(&mut writer, b"\n")?;
        }

        Ok(())
    }

    /// Serializes this envelope into a buffer.
    pub fn to_vec(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut vec = Vec::new();
        self.serialize(&mut vec)?;
        Ok(vec)
    }

    fn parse_headers(slice: &[u8]) -> Result<(EnvelopeHeaders, usize), EnvelopeError> {
        let mut stream = serde_json::Deserializer::from_slice(slice).into_iter();

        let headers = match stream.next() {
            None => return Err(EnvelopeError::MissingHeader),
            Some(Err(error)) => return Err(EnvelopeError::InvalidHeader(error)),
            Some(Ok(headers)) => headers,
        };

        // Each header is terminated by a UNIX newline.
        require_termination(slice, stream.byte_offset())?;

        Ok((headers, stream.byte_offset() + 1))
    }

    fn parse_items(bytes: &Bytes, mut offset: usize) -> Result<Items, EnvelopeError> {
        let mut items = Items::new();

        while offset < bytes.len() {
            let (item, item_size) = Item::parse(bytes.slice(offset..))?;
            offset += item_size;
            items.push(item);
        }

        Ok(items)
    }

    fn write<W>(&self, mut writer: W, buf: &[u8]) -> Result<(), EnvelopeError>
    where
        W: Write,
    {
        writer
            .write_all(buf)
            .map_err(EnvelopeError::PayloadIoFailed)
    }
}

fn require_termination(slice: &[u8], offset: usize) -> Result<(), EnvelopeError> {
    match slice.get(offset) {
        Some(&b'\n') | None => Ok(()),
        Some(_) => Err(EnvelopeError::MissingNewline),
    }
}

#[cfg(test)]
mod tests {
    use beacon_protocol::Attachment;
    use serde_json::json;

    use super::*;

    fn headers() -> EnvelopeHeaders {
        EnvelopeHeaders {
            event_id: Some("9ec79c33ec9942ab8353589fcb2e04dc".parse().unwrap()),
            dsn: Some(
                "https://e12d836b15bb49d7bbf99e64295d995b@sentry.io/42"
                    .parse()
                    .unwrap(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_envelope_empty() {
        let envelope = Envelope::new(headers());
        assert!(envelope.is_empty());
        assert_eq!(envelope.len(), 0);
        assert_eq!(envelope.item_types(), "");
    }

    #[test]
    fn test_serialize_envelope() {
        let mut envelope = Envelope::new(EnvelopeHeaders {
            sent_at: Some("2024-05-01T12:30:00.123Z".parse().unwrap()),
            ..headers()
        });
        envelope.add_item(Item::from_json(ItemType::Event, json!({"message": "hello"})));
        envelope.add_item(Item::statsd("a:1|c").unwrap());

        let serialized = String::from_utf8(envelope.to_vec().unwrap()).unwrap();
        insta::assert_snapshot!(serialized, @r#"
        {"event_id":"9ec79c33ec9942ab8353589fcb2e04dc","dsn":"https://e12d836b15bb49d7bbf99e64295d995b@sentry.io/42","sent_at":"2024-05-01T12:30:00Z"}
        {"type":"event","content_type":"application/json"}
        {"message":"hello"}
        {"type":"statsd","length":5}
        a:1|c
        "#);
    }

    #[test]
    fn test_deserialize_envelope_implicit_length() {
        // With terminating newline after item payload
        let bytes = Bytes::from(
            "\
             {\"event_id\":\"9ec79c33ec9942ab8353589fcb2e04dc\",\"dsn\":\"https://e12d836b15bb49d7bbf99e64295d995b@sentry.io/42\"}\n\
             {\"type\":\"attachment\"}\n\
             helloworld\n\
             ",
        );

        let envelope = Envelope::parse_bytes(bytes).unwrap();
        assert_eq!(envelope.len(), 1);

        let items: Vec<_> = envelope.items().collect();
        assert_eq!(items[0].payload_bytes().unwrap(), Bytes::from("helloworld"));
    }

    #[test]
    fn test_deserialize_envelope_implicit_length_empty_eof() {
        // Empty item with implicit length ending the envelope
        let bytes = Bytes::from(
            "\
             {\"event_id\":\"9ec79c33ec9942ab8353589fcb2e04dc\"}\n\
             {\"type\":\"attachment\"}\
             ",
        );

        let envelope = Envelope::parse_bytes(bytes).unwrap();
        assert_eq!(envelope.len(), 1);

        let items: Vec<_> = envelope.items().collect();
        assert!(items[0].payload_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_deserialize_envelope_multiple_items() {
        let bytes = Bytes::from(&b"\
            {\"event_id\":\"9ec79c33ec9942ab8353589fcb2e04dc\"}\n\
            {\"type\":\"attachment\",\"length\":10,\"content_type\":\"text/plain\",\"filename\":\"hello.txt\"}\n\
            \xef\xbb\xbfHello\r\n\n\
            {\"type\":\"event\",\"content_type\":\"application/json\"}\n\
            {\"message\":\"hello world\",\"level\":\"error\"}\n\
        "[..]);

        let envelope = Envelope::parse_bytes(bytes).unwrap();

        assert_eq!(envelope.len(), 2);
        let items: Vec<_> = envelope.items().collect();

        assert_eq!(items[0].ty(), &ItemType::Attachment);
        assert_eq!(items[0].len(), Some(10));
        assert_eq!(
            items[0].payload_bytes().unwrap(),
            Bytes::from(&b"\xef\xbb\xbfHello\r\n"[..])
        );
        assert_eq!(items[0].content_type(), Some("text/plain"));
        assert_eq!(items[0].filename(), Some("hello.txt"));

        assert_eq!(items[1].ty(), &ItemType::Event);
        assert_eq!(
            items[1].payload_bytes().unwrap(),
            Bytes::from("{\"message\":\"hello world\",\"level\":\"error\"}")
        );
    }

    #[test]
    fn test_deserialize_envelope_missing_newline() {
        let bytes = Bytes::from("{\"event_id\":\"9ec79c33ec9942ab8353589fcb2e04dc\"}garbage");
        assert!(matches!(
            Envelope::parse_bytes(bytes),
            Err(EnvelopeError::MissingNewline)
        ));
    }

    #[test]
    fn test_deserialize_envelope_length_overflow() {
        let bytes = Bytes::from("{}\n{\"type\":\"attachment\",\"length\":100}\nshort\n");
        assert!(matches!(
            Envelope::parse_bytes(bytes),
            Err(EnvelopeError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_roundtrip_preserves_order() {
        let attachment = Attachment::from_bytes("log.txt", "line 1\nline 2\n");

        let mut envelope = Envelope::new(headers());
        envelope.add_item(Item::from_json(ItemType::Event, json!({"message": "first"})));
        envelope.add_item(Item::attachment(&attachment, attachment.payload().unwrap()).unwrap());
        envelope.add_item(Item::profile(json!({"samples": []})));
        envelope.add_item(Item::statsd("b:2|c").unwrap());

        let parsed = Envelope::parse_bytes(envelope.to_vec().unwrap().into()).unwrap();

        assert_eq!(parsed.headers(), envelope.headers());
        assert_eq!(parsed.item_types(), "event, attachment, profile, statsd");
        for (original, parsed) in envelope.items().zip(parsed.items()) {
            assert_eq!(original.headers(), parsed.headers());
            assert_eq!(
                original.payload_bytes().unwrap(),
                parsed.payload_bytes().unwrap()
            );
        }
    }
}
