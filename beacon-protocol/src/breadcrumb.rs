use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::Level;

/// The default capacity of a [`BreadcrumbBuffer`].
pub const DEFAULT_MAX_BREADCRUMBS: usize = 100;

/// A trail of application events leading up to an event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Breadcrumb {
    /// The time at which the breadcrumb was recorded.
    pub timestamp: DateTime<Utc>,
    /// The type of breadcrumb, such as `default`, `http` or `navigation`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// A dotted string indicating what the breadcrumb is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Severity of the breadcrumb.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    /// Human readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Arbitrary data associated with the breadcrumb.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Breadcrumb {
    /// Creates a breadcrumb with a message, recorded now.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Creates a breadcrumb from a message of unknown encoding.
    ///
    /// A message that is not valid UTF-8 is dropped, the rest of the breadcrumb is kept.
    pub fn from_message_bytes(message: &[u8]) -> Self {
        Self {
            message: Self::message_from_bytes(message),
            ..Self::default()
        }
    }

    /// Converts raw bytes into a message, returning `None` for invalid UTF-8.
    pub fn message_from_bytes(message: &[u8]) -> Option<String> {
        std::str::from_utf8(message).ok().map(str::to_owned)
    }
}

impl Default for Breadcrumb {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            ty: None,
            category: None,
            level: None,
            message: None,
            data: BTreeMap::new(),
        }
    }
}

/// A bounded, ordered buffer of breadcrumbs.
///
/// Once the buffer holds `capacity` breadcrumbs, recording another one evicts the oldest.
/// Serializes as `{"values": [...]}` in recording order.
#[derive(Clone, Debug, PartialEq)]
pub struct BreadcrumbBuffer {
    capacity: usize,
    buffer: VecDeque<Breadcrumb>,
}

impl BreadcrumbBuffer {
    /// Creates an empty buffer holding at most `capacity` breadcrumbs.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_BREADCRUMBS)),
        }
    }

    /// Appends a breadcrumb, evicting the oldest if the buffer is full.
    pub fn record(&mut self, breadcrumb: Breadcrumb) {
        if self.capacity == 0 {
            return;
        }

        while self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }

        self.buffer.push_back(breadcrumb);
    }

    /// Appends all breadcrumbs of `other` in order.
    pub fn extend(&mut self, other: &BreadcrumbBuffer) {
        for breadcrumb in other.iter() {
            self.record(breadcrumb.clone());
        }
    }

    /// Returns the maximum number of breadcrumbs.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of breadcrumbs.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if there are no breadcrumbs.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Iterates breadcrumbs from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Breadcrumb> {
        self.buffer.iter()
    }

    /// Removes all breadcrumbs.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for BreadcrumbBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BREADCRUMBS)
    }
}

impl Serialize for BreadcrumbBuffer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Breadcrumbs", 1)?;
        state.serialize_field("values", &self.buffer)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut buffer = BreadcrumbBuffer::new(3);
        for i in 0..5 {
            buffer.record(Breadcrumb::new(format!("crumb {i}")));
        }

        let messages: Vec<_> = buffer.iter().filter_map(|b| b.message.as_deref()).collect();
        assert_eq!(messages, ["crumb 2", "crumb 3", "crumb 4"]);
    }

    #[test]
    fn test_zero_capacity() {
        let mut buffer = BreadcrumbBuffer::new(0);
        buffer.record(Breadcrumb::new("ignored"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_invalid_message_is_dropped() {
        let breadcrumb = Breadcrumb::from_message_bytes(b"\xff\xfe not utf-8");
        assert_eq!(breadcrumb.message, None);

        let breadcrumb = Breadcrumb::from_message_bytes("valid ✓".as_bytes());
        assert_eq!(breadcrumb.message.as_deref(), Some("valid ✓"));
    }

    #[test]
    fn test_serialize_values() {
        let mut buffer = BreadcrumbBuffer::new(10);
        buffer.record(Breadcrumb {
            ty: Some("http".to_owned()),
            category: Some("request".to_owned()),
            timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
            ..Breadcrumb::default()
        });

        insta::assert_snapshot!(serde_json::to_string(&buffer).unwrap(), @r#"{"values":[{"timestamp":"2024-01-01T00:00:00Z","type":"http","category":"request"}]}"#);
    }
}
