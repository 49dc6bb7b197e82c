use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EventBase, EventId};

/// The status of a monitor check-in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    /// The job started and has not finished yet.
    InProgress,
    /// The job finished successfully.
    Ok,
    /// The job failed.
    Error,
}

/// A check-in of a scheduled job monitor.
#[derive(Clone, Debug, Serialize)]
pub struct CheckInEvent {
    /// Attributes shared by all events.
    #[serde(flatten)]
    pub base: EventBase,
    /// Identifier of this check-in. An `in_progress` check-in is completed by sending another
    /// check-in with the same id.
    pub check_in_id: EventId,
    /// Identifier of the monitor.
    pub monitor_slug: String,
    /// Status of the job.
    pub status: CheckInStatus,
    /// Duration of the job in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Monitor configuration, used to upsert the monitor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_config: Option<Value>,
}

impl CheckInEvent {
    /// Creates a check-in for a monitor.
    pub fn new(monitor_slug: impl Into<String>, status: CheckInStatus) -> Self {
        Self {
            base: EventBase::default(),
            check_in_id: EventId::new(),
            monitor_slug: monitor_slug.into(),
            status,
            duration: None,
            monitor_config: None,
        }
    }
}
