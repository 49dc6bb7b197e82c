use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::{TraceId, datetime_to_secs};

/// Severity of a log record.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Fine grained tracing.
    Trace,
    /// Debug information.
    Debug,
    /// Informational messages.
    #[default]
    Info,
    /// A warning.
    Warn,
    /// An error.
    Error,
    /// An unrecoverable error.
    Fatal,
}

/// The value of a log attribute.
///
/// Serializes as `{"value": ..., "type": ...}`.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A signed integer value.
    Integer(i64),
    /// A floating point value.
    Double(f64),
    /// A boolean value.
    Boolean(bool),
}

impl AttributeValue {
    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Double(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            Self::String(value) => map.serialize_entry("value", value)?,
            Self::Integer(value) => map.serialize_entry("value", value)?,
            Self::Double(value) => map.serialize_entry("value", value)?,
            Self::Boolean(value) => map.serialize_entry("value", value)?,
        }
        map.serialize_entry("type", self.type_name())?;
        map.end()
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// The placeholder replaced by parameters in log templates.
const PLACEHOLDER: &str = "%s";

/// A structured log record.
///
/// Log records are batched by the client and sent together in a single `log` item.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogEvent {
    /// Time of the record in fractional seconds since the UNIX epoch.
    pub timestamp: f64,
    /// The trace active when the record was emitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    /// Severity of the record.
    pub level: LogLevel,
    /// The rendered message.
    pub body: String,
    /// Structured attributes.
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl LogEvent {
    /// Creates a log record with a plain message.
    pub fn new(level: LogLevel, body: impl Into<String>) -> Self {
        Self {
            timestamp: datetime_to_secs(Utc::now()),
            trace_id: None,
            level,
            body: body.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a log record from a template with `%s` placeholders.
    ///
    /// Placeholders are replaced with the parameters in order. The template and every parameter
    /// are kept as `sentry.message.template` and `sentry.message.parameter.<index>` attributes.
    /// Placeholders without a parameter are kept verbatim.
    pub fn from_template(level: LogLevel, template: &str, parameters: Vec<AttributeValue>) -> Self {
        let mut body = String::with_capacity(template.len());
        let mut parts = template.split(PLACEHOLDER);
        let mut params = parameters.iter();

        if let Some(first) = parts.next() {
            body.push_str(first);
        }

        for part in parts {
            match params.next() {
                Some(param) => body.push_str(&param.to_string()),
                None => body.push_str(PLACEHOLDER),
            }
            body.push_str(part);
        }

        let mut log = Self::new(level, body);
        if !parameters.is_empty() {
            log.set_attribute("sentry.message.template", template);
            for (index, parameter) in parameters.into_iter().enumerate() {
                log.set_attribute(format!("sentry.message.parameter.{index}"), parameter);
            }
        }

        log
    }

    /// Sets an attribute, replacing a previous value.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }
}
