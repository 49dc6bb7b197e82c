//! Callbacks through which applications take part in the pipeline.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use beacon_protocol::Event;
use serde_json::{Map, Value};

/// Errors raised by application callbacks.
pub type HookError = Box<dyn Error + Send + Sync>;

/// Additional information passed along with an event to all callbacks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hint {
    /// Overrides background dispatch for a single event.
    ///
    /// `Some(false)` sends the event on the calling thread, even if background workers are
    /// configured.
    pub background: Option<bool>,
    /// Arbitrary data for callbacks, such as the original exception object.
    pub data: BTreeMap<String, Value>,
}

impl Hint {
    /// Creates a hint that forces synchronous delivery.
    pub fn synchronous() -> Self {
        Self {
            background: Some(false),
            ..Self::default()
        }
    }

    /// Adds a data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// The outcome of a before-send hook.
#[derive(Debug)]
pub enum BeforeSendResult {
    /// Send this event. It may have been modified by the hook.
    Unchanged(Event),
    /// Drop the event.
    Discarded,
    /// Send a raw payload verbatim.
    ///
    /// Supported for compatibility with hooks that build the payload themselves. Raw payloads
    /// are not validated.
    LegacyRaw(Map<String, Value>),
}

impl From<Option<Event>> for BeforeSendResult {
    fn from(event: Option<Event>) -> Self {
        match event {
            Some(event) => Self::Unchanged(event),
            None => Self::Discarded,
        }
    }
}

/// A hook invoked with every event right before it is dispatched.
pub type BeforeSend =
    Arc<dyn Fn(Event, &Hint) -> Result<BeforeSendResult, HookError> + Send + Sync>;

/// A processor applied by a scope to every event.
///
/// Returning `None` drops the event.
pub type EventProcessor =
    Arc<dyn Fn(Event, &Hint) -> Result<Option<Event>, HookError> + Send + Sync>;

/// A callback that takes over delivery of events.
///
/// The callback receives the JSON payload of the event. If it fails, the client falls back to
/// sending the event itself.
#[derive(Clone)]
pub enum AsyncCallback {
    /// A callback that only needs the event.
    Event(Arc<dyn Fn(Value) -> Result<(), HookError> + Send + Sync>),
    /// A callback that also receives the hint.
    EventWithHint(Arc<dyn Fn(Value, &Hint) -> Result<(), HookError> + Send + Sync>),
}

impl AsyncCallback {
    /// Creates a callback that receives the event payload.
    pub fn event<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<(), HookError> + Send + Sync + 'static,
    {
        Self::Event(Arc::new(f))
    }

    /// Creates a callback that receives the event payload and the hint.
    pub fn event_with_hint<F>(f: F) -> Self
    where
        F: Fn(Value, &Hint) -> Result<(), HookError> + Send + Sync + 'static,
    {
        Self::EventWithHint(Arc::new(f))
    }

    /// Invokes the callback.
    pub fn call(&self, payload: Value, hint: &Hint) -> Result<(), HookError> {
        match self {
            Self::Event(f) => f(payload),
            Self::EventWithHint(f) => f(payload, hint),
        }
    }
}

impl fmt::Debug for AsyncCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(_) => f.write_str("AsyncCallback::Event"),
            Self::EventWithHint(_) => f.write_str("AsyncCallback::EventWithHint"),
        }
    }
}
