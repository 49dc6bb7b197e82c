//! Defines the [`DataCategory`] type that classifies data sent by the client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classifies the type of data that is being sent.
///
/// Rate limits returned by the server and client reports both refer to these categories by their
/// [`name`](Self::name).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    /// Reserved and unused.
    Default,
    /// Error events and Events with an `event_type` not explicitly listed below.
    Error,
    /// Transaction events.
    Transaction,
    /// Events with an event type of `csp`, `hpkp`, `expectct` and `expectstaple`.
    Security,
    /// An attachment.
    Attachment,
    /// Session updates.
    Session,
    /// A profile attached to a transaction.
    Profile,
    /// Monitor check-ins.
    Monitor,
    /// Spans contained in a transaction.
    Span,
    /// A single log record within a batched log item.
    Log,
    /// Metric buckets, sent as raw statsd payloads.
    MetricBucket,
    /// Data that the client sends about itself, such as client reports.
    Internal,
    /// Any other data category not known by this client.
    #[serde(other)]
    Unknown,
}

impl DataCategory {
    /// Returns the data category corresponding to the given name.
    pub fn from_name(string: &str) -> Self {
        match string {
            "default" => Self::Default,
            "error" => Self::Error,
            "transaction" => Self::Transaction,
            "security" => Self::Security,
            "attachment" => Self::Attachment,
            "session" => Self::Session,
            "profile" => Self::Profile,
            "monitor" => Self::Monitor,
            "span" => Self::Span,
            "log" => Self::Log,
            "metric_bucket" => Self::MetricBucket,
            "internal" => Self::Internal,
            _ => Self::Unknown,
        }
    }

    /// Returns the canonical name of this data category.
    pub fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Error => "error",
            Self::Transaction => "transaction",
            Self::Security => "security",
            Self::Attachment => "attachment",
            Self::Session => "session",
            Self::Profile => "profile",
            Self::Monitor => "monitor",
            Self::Span => "span",
            Self::Log => "log",
            Self::MetricBucket => "metric_bucket",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true if the DataCategory refers to an error (i.e an error event).
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::Default | Self::Security)
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DataCategory {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for category in [
            DataCategory::Error,
            DataCategory::Transaction,
            DataCategory::Span,
            DataCategory::Log,
            DataCategory::Monitor,
            DataCategory::Internal,
        ] {
            assert_eq!(DataCategory::from_name(category.name()), category);
        }
    }

    #[test]
    fn test_unknown_category() {
        assert_eq!(DataCategory::from_name("replay"), DataCategory::Unknown);
        assert_eq!(DataCategory::from_name("log_item"), DataCategory::Unknown);
        let parsed: DataCategory = serde_json::from_str(r#""replay""#).unwrap();
        assert_eq!(parsed, DataCategory::Unknown);
    }

    #[test]
    fn test_serialize_snake_case() {
        let json = serde_json::to_string(&DataCategory::Log).unwrap();
        assert_eq!(json, r#""log""#);
    }
}
