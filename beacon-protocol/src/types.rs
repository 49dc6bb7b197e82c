use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity level of an event or breadcrumb.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Indicates very spammy debug information.
    Debug,
    /// Informational messages.
    #[default]
    Info,
    /// A warning.
    Warning,
    /// An error.
    Error,
    /// Similar to error but indicates a critical event that usually causes a shutdown.
    Fatal,
}

impl Level {
    /// Returns the name of the level as it appears in payloads.
    pub fn name(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

/// An error used when parsing `Level`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseLevelError;

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid level")
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        Ok(match string {
            "debug" => Level::Debug,
            "info" | "log" => Level::Info,
            "warning" | "warn" => Level::Warning,
            "error" => Level::Error,
            "fatal" | "critical" => Level::Fatal,
            _ => return Err(ParseLevelError),
        })
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A list of values wrapped in an object, as in `{"values": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Values<T> {
    /// The wrapped values.
    pub values: Vec<T>,
}

impl<T> Values<T> {
    /// Wraps a list of values.
    pub fn new(values: Vec<T>) -> Self {
        Self { values }
    }

    /// Returns `true` if there are no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Information about the user who triggered an event.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct User {
    /// Unique identifier of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Email address of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Remote IP address of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Username of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Additional arbitrary fields.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// The SDK that produced an event.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ClientSdkInfo {
    /// Unique SDK name.
    pub name: String,
    /// SDK version.
    pub version: String,
}

impl ClientSdkInfo {
    /// Returns the identity of this client.
    pub fn beacon() -> Self {
        Self {
            name: SDK_NAME.to_owned(),
            version: SDK_VERSION.to_owned(),
        }
    }

    /// Returns `name/version` as used in user agents and auth headers.
    pub fn client_name(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Name reported as SDK identity.
pub const SDK_NAME: &str = "beacon";

/// Version reported as SDK identity.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Converts a timestamp to fractional seconds since the UNIX epoch.
pub fn datetime_to_secs(datetime: DateTime<Utc>) -> f64 {
    datetime.timestamp_micros() as f64 / 1_000_000.0
}

/// Converts fractional seconds since the UNIX epoch to a timestamp.
///
/// Returns `None` for values outside of the supported range.
pub fn secs_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }

    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!("warn".parse::<Level>(), Ok(Level::Warning));
        assert_eq!(Level::Warning.to_string(), "warning");
        assert_eq!(serde_json::to_string(&Level::Fatal).unwrap(), r#""fatal""#);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn test_user_flattens_other() {
        let mut user = User {
            id: Some("42".to_owned()),
            ..Default::default()
        };
        user.other.insert("segment".to_owned(), "paid".into());

        insta::assert_snapshot!(serde_json::to_string(&user).unwrap(), @r#"{"id":"42","segment":"paid"}"#);
    }

    #[test]
    fn test_timestamp_conversion() {
        let datetime = secs_to_datetime(1_700_000_000.25).unwrap();
        assert_eq!(datetime.timestamp(), 1_700_000_000);
        assert_eq!(datetime_to_secs(datetime), 1_700_000_000.25);
        assert!(secs_to_datetime(f64::NAN).is_none());
    }
}
