use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{EventBase, SpanId, TraceId, datetime_to_secs, secs_to_datetime};

/// A timed operation within a trace.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Span {
    /// The trace this span belongs to.
    pub trace_id: TraceId,
    /// Identifier of this span.
    pub span_id: SpanId,
    /// Identifier of the parent span, `None` for the root span of a trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Short code identifying the type of operation, such as `db.query`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// Human readable description of the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Completion status of the operation, such as `ok` or `internal_error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Start time in fractional seconds since the UNIX epoch.
    pub start_timestamp: f64,
    /// End time in fractional seconds since the UNIX epoch, `None` while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// Arbitrary data associated with the span.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Span {
    /// Starts the root span of a new trace.
    pub fn root(op: impl Into<String>) -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            parent_span_id: None,
            op: Some(op.into()),
            description: None,
            status: None,
            start_timestamp: datetime_to_secs(Utc::now()),
            timestamp: None,
            data: BTreeMap::new(),
        }
    }

    /// Starts a child span of this span.
    pub fn child(&self, op: impl Into<String>) -> Self {
        Self {
            trace_id: self.trace_id,
            parent_span_id: Some(self.span_id),
            ..Self::root(op)
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the span as finished now, unless it is already finished.
    pub fn finish(&mut self) {
        if self.timestamp.is_none() {
            self.timestamp = Some(datetime_to_secs(Utc::now()));
        }
    }

    /// Returns the trace context of this span, as stored in an event's `contexts.trace`.
    pub fn trace_context(&self) -> Value {
        let mut context = json!({
            "trace_id": self.trace_id,
            "span_id": self.span_id,
        });

        let fields = [
            ("parent_span_id", self.parent_span_id.map(|id| json!(id))),
            ("op", self.op.as_ref().map(|op| json!(op))),
            ("description", self.description.as_ref().map(|d| json!(d))),
            ("status", self.status.as_ref().map(|s| json!(s))),
        ];

        if let Value::Object(ref mut map) = context {
            for (key, value) in fields {
                if let Some(value) = value {
                    map.insert(key.to_owned(), value);
                }
            }

            if !self.data.is_empty() {
                map.insert("data".to_owned(), json!(self.data));
            }
        }

        context
    }
}

/// How the name of a transaction was determined.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionSource {
    /// User-defined name.
    #[default]
    Custom,
    /// Raw URL, potentially containing identifiers.
    Url,
    /// Parametrized URL or route.
    Route,
    /// Name of the view handling the request.
    View,
    /// Named after a software component, such as a function or class name.
    Component,
    /// Name of a background task.
    Task,
}

/// Additional information about the name of a transaction.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TransactionInfo {
    /// The source of the transaction name.
    pub source: TransactionSource,
}

/// A finished transaction with its child spans.
///
/// The transaction itself is the `root` span. Its trace context is written into
/// `contexts.trace` when the event is created. `spans` holds all other spans of the transaction.
#[derive(Clone, Debug, Serialize)]
pub struct TransactionEvent {
    /// Attributes shared by all events.
    #[serde(flatten)]
    pub base: EventBase,
    /// Start time of the root span.
    pub start_timestamp: f64,
    /// Child spans, not including the root span.
    pub spans: Vec<Span>,
    /// Information about the transaction name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_info: Option<TransactionInfo>,
    /// The root span.
    #[serde(skip)]
    pub root: Span,
    /// The sampling decision made when the transaction started.
    #[serde(skip)]
    pub sampled: Option<bool>,
    /// Profiling data, sent as a separate `profile` item.
    #[serde(skip)]
    pub profile: Option<Value>,
}

impl TransactionEvent {
    /// Creates a transaction event from its root span.
    ///
    /// The event timestamp is the end of the root span, or now if it has not finished.
    pub fn new(name: impl Into<String>, root: Span) -> Self {
        let mut base = EventBase {
            transaction: Some(name.into()),
            ..EventBase::default()
        };

        if let Some(timestamp) = root.timestamp.and_then(secs_to_datetime) {
            base.timestamp = timestamp;
        }

        base.contexts.insert("trace".to_owned(), root.trace_context());

        Self {
            base,
            start_timestamp: root.start_timestamp,
            spans: Vec::new(),
            transaction_info: Some(TransactionInfo::default()),
            root,
            sampled: Some(true),
            profile: None,
        }
    }

    /// Returns the trace of this transaction.
    pub fn trace_id(&self) -> TraceId {
        self.root.trace_id
    }

    /// Returns the number of spans including the root span.
    pub fn span_count(&self) -> usize {
        self.spans.len() + 1
    }
}
