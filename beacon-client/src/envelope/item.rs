use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use beacon_common::DataCategory;
use beacon_protocol::{Attachment, ClientReport, LogEvent};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    JSON_CONTENT_TYPE, LOG_CONTAINER_CONTENT_TYPE, MAX_ATTACHMENT_SIZE, MAX_EVENT_SIZE,
    MAX_PROFILE_SIZE,
};
use crate::envelope::EnvelopeError;

/// The type of an envelope item.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ItemType {
    /// Error or message event encoded in JSON.
    Event,
    /// Transaction event encoded in JSON.
    Transaction,
    /// Monitor check-in encoded in JSON.
    CheckIn,
    /// Raw payload of an arbitrary attachment.
    Attachment,
    /// Profile of a transaction encoded in JSON.
    Profile,
    /// Client report of discarded data.
    ClientReport,
    /// A batch of log records in a JSON container.
    Log,
    /// Pre-formatted statsd metrics, sent verbatim.
    Statsd,
    /// A new item type that is unknown by this client.
    Unknown(String),
}

impl ItemType {
    /// Returns the name of the item type as it appears in item headers.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Event => "event",
            Self::Transaction => "transaction",
            Self::CheckIn => "check_in",
            Self::Attachment => "attachment",
            Self::Profile => "profile",
            Self::ClientReport => "client_report",
            Self::Log => "log",
            Self::Statsd => "statsd",
            Self::Unknown(s) => s,
        }
    }

    /// Returns the data category used to rate limit and report items of this type.
    pub fn data_category(&self) -> DataCategory {
        match self {
            Self::Event => DataCategory::Error,
            Self::Transaction => DataCategory::Transaction,
            Self::CheckIn => DataCategory::Monitor,
            Self::Attachment => DataCategory::Attachment,
            Self::Profile => DataCategory::Profile,
            Self::ClientReport => DataCategory::Internal,
            Self::Log => DataCategory::Log,
            Self::Statsd => DataCategory::MetricBucket,
            Self::Unknown(_) => DataCategory::Default,
        }
    }

    /// Returns the maximum size of a serialized payload of this type.
    pub fn max_payload_size(&self) -> usize {
        match self {
            Self::Attachment => MAX_ATTACHMENT_SIZE,
            Self::Profile => MAX_PROFILE_SIZE,
            _ => MAX_EVENT_SIZE,
        }
    }

    /// Returns `true` if oversized payloads of this type may be reduced before rejecting them.
    pub fn is_reducible(&self) -> bool {
        matches!(self, Self::Event | Self::Transaction)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "event" => Self::Event,
            "transaction" => Self::Transaction,
            "check_in" => Self::CheckIn,
            "attachment" => Self::Attachment,
            "profile" => Self::Profile,
            "client_report" => Self::ClientReport,
            "log" => Self::Log,
            "statsd" => Self::Statsd,
            other => Self::Unknown(other.to_owned()),
        })
    }
}

beacon_common::impl_str_serde!(ItemType, "an envelope item type");

/// Headers of an envelope item, written as a single JSON line before the payload.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ItemHeaders {
    /// The type of the item.
    #[serde(rename = "type")]
    ty: ItemType,

    /// Content length of the item.
    ///
    /// Can be omitted if the item does not contain new lines. In this case, the item payload is
    /// parsed until the first newline is encountered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<u32>,

    /// Number of records in a batched container item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    item_count: Option<u32>,

    /// If this is an attachment item, this may contain the original file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,

    /// Content type of the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,

    /// If this is an attachment item, this may contain the attachment type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachment_type: Option<String>,
}

/// The payload of an item.
#[derive(Clone, Debug, PartialEq)]
pub enum ItemPayload {
    /// A JSON document, serialized when the envelope is written.
    Json(Value),
    /// Pre-serialized bytes, written verbatim.
    Bytes(Bytes),
}

/// An item in an [`Envelope`](crate::envelope::Envelope).
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    headers: ItemHeaders,
    payload: ItemPayload,
}

impl Item {
    /// Creates a new item of the given type without a payload.
    pub fn new(ty: ItemType) -> Self {
        Self {
            headers: ItemHeaders {
                ty,
                length: None,
                item_count: None,
                filename: None,
                content_type: None,
                attachment_type: None,
            },
            payload: ItemPayload::Bytes(Bytes::new()),
        }
    }

    /// Creates an item carrying an event payload.
    pub fn from_json(ty: ItemType, payload: Value) -> Self {
        let mut item = Self::new(ty);
        item.headers.content_type = Some(JSON_CONTENT_TYPE.to_owned());
        item.payload = ItemPayload::Json(payload);
        item
    }

    /// Creates an attachment item from already loaded contents.
    pub fn attachment(attachment: &Attachment, payload: Bytes) -> Result<Self, EnvelopeError> {
        let mut item = Self::new(ItemType::Attachment);
        item.headers.filename = Some(attachment.filename.clone());
        item.headers.content_type = attachment.content_type.clone();
        item.headers.attachment_type = Some(attachment.attachment_type.clone());
        item.set_payload_bytes(payload)?;
        Ok(item)
    }

    /// Creates a profile item.
    pub fn profile(profile: Value) -> Self {
        Self::from_json(ItemType::Profile, profile)
    }

    /// Creates a client report item.
    pub fn client_report(report: &ClientReport) -> Result<Self, EnvelopeError> {
        let payload = serde_json::to_value(report).map_err(EnvelopeError::InvalidPayload)?;
        let mut item = Self::new(ItemType::ClientReport);
        item.payload = ItemPayload::Json(payload);
        Ok(item)
    }

    /// Creates a batched log item with all records in a single container.
    pub fn logs(logs: &[LogEvent]) -> Result<Self, EnvelopeError> {
        let items = serde_json::to_value(logs).map_err(EnvelopeError::InvalidPayload)?;
        let mut item = Self::new(ItemType::Log);
        item.headers.item_count = Some(record_count(logs.len())?);
        item.headers.content_type = Some(LOG_CONTAINER_CONTENT_TYPE.to_owned());
        item.payload = ItemPayload::Json(serde_json::json!({ "items": items }));
        Ok(item)
    }

    /// Creates an item for pre-formatted statsd metrics.
    pub fn statsd(payload: impl Into<Bytes>) -> Result<Self, EnvelopeError> {
        let mut item = Self::new(ItemType::Statsd);
        item.set_payload_bytes(payload.into())?;
        Ok(item)
    }

    /// Returns the item header.
    pub fn headers(&self) -> &ItemHeaders {
        &self.headers
    }

    /// Returns the type of this item.
    pub fn ty(&self) -> &ItemType {
        &self.headers.ty
    }

    /// Returns the data category of this item.
    pub fn data_category(&self) -> DataCategory {
        self.ty().data_category()
    }

    /// Returns the declared length of the payload, if any.
    pub fn len(&self) -> Option<usize> {
        self.headers.length.map(|len| len as usize)
    }

    /// Returns the number of records in a container item.
    pub fn item_count(&self) -> Option<u32> {
        self.headers.item_count
    }

    /// Returns the content type of the payload.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type.as_deref()
    }

    /// Returns the file name of an attachment.
    pub fn filename(&self) -> Option<&str> {
        self.headers.filename.as_deref()
    }

    /// Returns the attachment type of an attachment.
    pub fn attachment_type(&self) -> Option<&str> {
        self.headers.attachment_type.as_deref()
    }

    /// Returns the payload.
    pub fn payload(&self) -> &ItemPayload {
        &self.payload
    }

    /// Returns the JSON payload, if the item holds one.
    pub fn json(&self) -> Option<&Value> {
        match self.payload {
            ItemPayload::Json(ref value) => Some(value),
            ItemPayload::Bytes(_) => None,
        }
    }

    /// Returns the number of spans in a transaction item, including the root span.
    pub fn span_count(&self) -> usize {
        if *self.ty() != ItemType::Transaction {
            return 0;
        }

        self.json()
            .and_then(|payload| payload.get("spans"))
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
            + 1
    }

    /// Returns the serialized payload.
    pub fn payload_bytes(&self) -> Result<Bytes, EnvelopeError> {
        match self.payload {
            ItemPayload::Json(ref value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(EnvelopeError::InvalidPayload),
            ItemPayload::Bytes(ref bytes) => Ok(bytes.clone()),
        }
    }

    /// Sets a pre-serialized payload.
    ///
    /// Items that declared a length keep it in sync with the new payload. Fails without changing
    /// the item if that length does not fit into the header.
    pub fn set_payload_bytes(&mut self, payload: Bytes) -> Result<(), EnvelopeError> {
        if self.headers.length.is_some() || self.json().is_none() {
            self.headers.length = Some(payload_length(payload.len())?);
        }
        self.payload = ItemPayload::Bytes(payload);
        Ok(())
    }

    /// Parses an item from the start of `bytes`.
    ///
    /// Returns the item and the number of bytes consumed, including the trailing newline.
    pub fn parse(bytes: Bytes) -> Result<(Item, usize), EnvelopeError> {
        let slice = bytes.as_ref();
        let mut stream = serde_json::Deserializer::from_slice(slice).into_iter();

        let headers: ItemHeaders = match stream.next() {
            None => return Err(EnvelopeError::UnexpectedEof),
            Some(Err(error)) => return Err(EnvelopeError::InvalidItemHeader(error)),
            Some(Ok(headers)) => headers,
        };

        // Each header is terminated by a UNIX newline.
        let headers_end = stream.byte_offset();
        super::require_termination(slice, headers_end)?;

        // The last header does not require a trailing newline, so `payload_start` may point
        // past the end of the buffer.
        let payload_start = std::cmp::min(headers_end + 1, bytes.len());
        let payload_end = match headers.length {
            Some(len) => {
                let payload_end = payload_start + len as usize;
                if bytes.len() < payload_end {
                    // NB: `Bytes::slice` panics if the indices are out of range.
                    return Err(EnvelopeError::UnexpectedEof);
                }

                // Each payload is terminated by a UNIX newline.
                super::require_termination(slice, payload_end)?;
                payload_end
            }
            None => match bytes[payload_start..].iter().position(|b| *b == b'\n') {
                Some(relative_end) => payload_start + relative_end,
                None => bytes.len(),
            },
        };

        let payload = ItemPayload::Bytes(bytes.slice(payload_start..payload_end));
        let item = Item { headers, payload };

        Ok((item, payload_end + 1))
    }
}

/// Converts a payload size into the `length` header.
fn payload_length(len: usize) -> Result<u32, EnvelopeError> {
    u32::try_from(len).map_err(|_| EnvelopeError::PayloadTooLarge(len))
}

/// Converts the number of records in a container into the `item_count` header.
fn record_count(count: usize) -> Result<u32, EnvelopeError> {
    u32::try_from(count).map_err(|_| EnvelopeError::TooManyRecords(count))
}
