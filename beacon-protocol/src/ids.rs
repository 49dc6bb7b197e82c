use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use uuid::Uuid;

/// Wrapper around a UUID with slightly different formatting.
///
/// Event identifiers are formatted as 32 lowercase hex characters without dashes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new event id using a UUID v4.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Tests if the UUID is nil.
    #[inline]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for EventId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

impl FromStr for EventId {
    type Err = <Uuid as FromStr>::Err;

    fn from_str(uuid_str: &str) -> Result<Self, Self::Err> {
        uuid_str.parse().map(EventId)
    }
}

beacon_common::impl_str_serde!(EventId, "an event identifier");

/// A 128-bit identifier shared by all spans and events of a trace.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Creates a random trace id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

impl FromStr for TraceId {
    type Err = <Uuid as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

beacon_common::impl_str_serde!(TraceId, "a trace identifier");

/// A 64-bit span identifier, formatted as 16 lowercase hex characters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Creates a random span id.
    pub fn random() -> Self {
        Self(rand::random_range(1..=u64::MAX))
    }
}

impl Default for SpanId {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(Self)
    }
}

beacon_common::impl_str_serde!(SpanId, "a span identifier");
