use std::collections::BTreeMap;
use std::fmt;

use beacon_common::DataCategory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    Attachment, BreadcrumbBuffer, CheckInEvent, ClientSdkInfo, ErrorEvent, EventId, Level,
    TransactionEvent, User,
};

/// Trace metadata propagated in the envelope header for downstream sampling decisions.
pub type DynamicSamplingContext = BTreeMap<String, String>;

/// The platform reported for events of this client.
pub const PLATFORM: &str = "native";

/// Attributes shared by all kinds of events.
#[derive(Clone, Debug, Serialize)]
pub struct EventBase {
    /// Unique identifier of this event.
    pub event_id: EventId,
    /// Time at which the event was created, or finished for transactions.
    pub timestamp: DateTime<Utc>,
    /// Platform identifier of this event.
    pub platform: String,
    /// Severity level of the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    /// The release this event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// The environment this event was captured in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Name of the host that captured the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// Name of the transaction, or the route that caused the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    /// The SDK that captured the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk: Option<ClientSdkInfo>,
    /// The user affected by the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Custom string tags.
    pub tags: BTreeMap<String, String>,
    /// Structured contexts, keyed by context name.
    pub contexts: BTreeMap<String, Value>,
    /// Arbitrary additional data.
    pub extra: BTreeMap<String, Value>,
    /// Manual grouping fingerprint.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fingerprint: Vec<String>,
    /// Breadcrumbs recorded before the event.
    #[serde(skip_serializing_if = "BreadcrumbBuffer::is_empty")]
    pub breadcrumbs: BreadcrumbBuffer,
    /// Files sent as separate envelope items.
    #[serde(skip)]
    pub attachments: Vec<Attachment>,
    /// Trace metadata sent in the envelope header.
    #[serde(skip)]
    pub dynamic_sampling_context: Option<DynamicSamplingContext>,
}

impl Default for EventBase {
    fn default() -> Self {
        Self {
            event_id: EventId::new(),
            timestamp: Utc::now(),
            platform: PLATFORM.to_owned(),
            level: None,
            release: None,
            environment: None,
            server_name: None,
            transaction: None,
            sdk: None,
            user: None,
            tags: BTreeMap::new(),
            contexts: BTreeMap::new(),
            extra: BTreeMap::new(),
            fingerprint: Vec::new(),
            breadcrumbs: BreadcrumbBuffer::default(),
            attachments: Vec::new(),
            dynamic_sampling_context: None,
        }
    }
}

/// The kind of an event, which determines the envelope item it is sent in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventType {
    /// Errors and messages, sent as `event` items.
    Error,
    /// Transactions, sent as `transaction` items.
    Transaction,
    /// Monitor check-ins, sent as `check_in` items.
    CheckIn,
}

impl EventType {
    /// Returns the envelope item type name of this event type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "event",
            Self::Transaction => "transaction",
            Self::CheckIn => "check_in",
        }
    }

    /// Returns the data category for rate limits and client reports.
    pub fn data_category(self) -> DataCategory {
        match self {
            Self::Error => DataCategory::Error,
            Self::Transaction => DataCategory::Transaction,
            Self::CheckIn => DataCategory::Monitor,
        }
    }

    fn from_raw(name: Option<&str>) -> Self {
        match name {
            Some("transaction") => Self::Transaction,
            Some("check_in") => Self::CheckIn,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any event that can be captured by the client.
#[derive(Clone, Debug)]
pub enum Event {
    /// An error or message.
    Error(Box<ErrorEvent>),
    /// A finished transaction with its spans.
    Transaction(Box<TransactionEvent>),
    /// A monitor check-in.
    CheckIn(Box<CheckInEvent>),
    /// An untyped payload, sent verbatim.
    ///
    /// Hooks returning a raw payload produce this variant. The payload is not validated, only its
    /// `type`, `event_id` and `spans` keys are read.
    Raw(Map<String, Value>),
}

impl Event {
    /// Returns the kind of this event.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Error(_) => EventType::Error,
            Self::Transaction(_) => EventType::Transaction,
            Self::CheckIn(_) => EventType::CheckIn,
            Self::Raw(map) => EventType::from_raw(map.get("type").and_then(Value::as_str)),
        }
    }

    /// Returns `true` for transactions, including raw transaction payloads.
    pub fn is_transaction(&self) -> bool {
        self.event_type() == EventType::Transaction
    }

    /// Returns the data category of this event.
    pub fn data_category(&self) -> DataCategory {
        self.event_type().data_category()
    }

    /// Returns the identifier of this event, if it has a valid one.
    pub fn event_id(&self) -> Option<EventId> {
        match self {
            Self::Raw(map) => map.get("event_id")?.as_str()?.parse().ok(),
            _ => self.base().map(|base| base.event_id),
        }
    }

    /// Returns the attributes shared by typed events.
    pub fn base(&self) -> Option<&EventBase> {
        match self {
            Self::Error(event) => Some(&event.base),
            Self::Transaction(event) => Some(&event.base),
            Self::CheckIn(event) => Some(&event.base),
            Self::Raw(_) => None,
        }
    }

    /// Returns mutable access to the attributes shared by typed events.
    pub fn base_mut(&mut self) -> Option<&mut EventBase> {
        match self {
            Self::Error(event) => Some(&mut event.base),
            Self::Transaction(event) => Some(&mut event.base),
            Self::CheckIn(event) => Some(&mut event.base),
            Self::Raw(_) => None,
        }
    }

    /// Returns the number of spans in a transaction, including the root span.
    ///
    /// Returns `0` for all other events.
    pub fn span_count(&self) -> usize {
        match self {
            Self::Transaction(transaction) => transaction.span_count(),
            Self::Raw(map) if self.is_transaction() => {
                map.get("spans").and_then(Value::as_array).map_or(0, Vec::len) + 1
            }
            _ => 0,
        }
    }

    /// Returns the attachments of this event.
    pub fn attachments(&self) -> &[Attachment] {
        match self.base() {
            Some(base) => &base.attachments,
            None => &[],
        }
    }

    /// Returns the dynamic sampling context for the envelope header.
    pub fn dynamic_sampling_context(&self) -> Option<&DynamicSamplingContext> {
        self.base()?.dynamic_sampling_context.as_ref()
    }

    /// Returns the profile of a transaction.
    pub fn profile(&self) -> Option<&Value> {
        match self {
            Self::Transaction(transaction) => transaction.profile.as_ref(),
            _ => None,
        }
    }

    /// Serializes the event into its JSON payload.
    ///
    /// Typed events get a `type` key. Raw payloads are returned unchanged.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        let mut value = match self {
            Self::Error(event) => serde_json::to_value(event)?,
            Self::Transaction(event) => serde_json::to_value(event)?,
            Self::CheckIn(event) => serde_json::to_value(event)?,
            Self::Raw(map) => return Ok(Value::Object(map.clone())),
        };

        if let Value::Object(ref mut map) = value {
            map.insert("type".to_owned(), self.event_type().as_str().into());
        }

        Ok(value)
    }
}

impl From<ErrorEvent> for Event {
    fn from(event: ErrorEvent) -> Self {
        Self::Error(Box::new(event))
    }
}

impl From<TransactionEvent> for Event {
    fn from(event: TransactionEvent) -> Self {
        Self::Transaction(Box::new(event))
    }
}

impl From<CheckInEvent> for Event {
    fn from(event: CheckInEvent) -> Self {
        Self::CheckIn(Box::new(event))
    }
}

impl From<Map<String, Value>> for Event {
    fn from(map: Map<String, Value>) -> Self {
        Self::Raw(map)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Breadcrumb, CheckInStatus, Span};

    fn fixed_base() -> EventBase {
        EventBase {
            event_id: "52df9022835246eeb317dbd739ccd059".parse().unwrap(),
            timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
            ..EventBase::default()
        }
    }

    #[test]
    fn test_error_event_json() {
        let mut event = ErrorEvent::from_message("hello");
        event.base = EventBase {
            level: Some(Level::Warning),
            ..fixed_base()
        };
        event.base.tags.insert("key".to_owned(), "value".to_owned());

        insta::assert_json_snapshot!(Event::from(event).to_json().unwrap(), @r#"
        {
          "contexts": {},
          "event_id": "52df9022835246eeb317dbd739ccd059",
          "extra": {},
          "level": "warning",
          "message": "hello",
          "platform": "native",
          "tags": {
            "key": "value"
          },
          "timestamp": "2024-01-01T00:00:00Z",
          "type": "event"
        }
        "#);
    }

    #[test]
    fn test_breadcrumbs_serialized_when_present() {
        let mut event = ErrorEvent::default();
        event.base.breadcrumbs.record(Breadcrumb::new("clicked"));

        let json = Event::from(event).to_json().unwrap();
        assert_eq!(json["breadcrumbs"]["values"][0]["message"], "clicked");
    }

    #[test]
    fn test_event_types() {
        let error = Event::from(ErrorEvent::default());
        assert_eq!(error.data_category(), DataCategory::Error);
        assert_eq!(error.span_count(), 0);

        let transaction = Event::from(TransactionEvent::new("GET /", Span::root("http.server")));
        assert!(transaction.is_transaction());
        assert_eq!(transaction.data_category(), DataCategory::Transaction);
        assert_eq!(transaction.span_count(), 1);

        let check_in = Event::from(CheckInEvent::new("nightly", CheckInStatus::Ok));
        assert_eq!(check_in.event_type().as_str(), "check_in");
        assert_eq!(check_in.data_category(), DataCategory::Monitor);
    }

    #[test]
    fn test_raw_event() {
        let json = json!({
            "type": "transaction",
            "event_id": "52df9022835246eeb317dbd739ccd059",
            "spans": [{}, {}],
        });

        let Value::Object(map) = json.clone() else {
            unreachable!()
        };

        let event = Event::from(map);
        assert!(event.is_transaction());
        assert_eq!(event.span_count(), 3);
        assert_eq!(
            event.event_id().unwrap().to_string(),
            "52df9022835246eeb317dbd739ccd059"
        );
        assert!(event.base().is_none());
        assert_eq!(event.to_json().unwrap(), json);
    }
}
