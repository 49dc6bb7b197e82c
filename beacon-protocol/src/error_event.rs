use serde::Serialize;

use crate::{EventBase, Exception, Level, Thread, Values};

/// Maximum size of an event message in bytes. Longer messages are truncated.
pub const MAX_MESSAGE_SIZE_IN_BYTES: usize = 1024 * 8;

/// An error or message event.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ErrorEvent {
    /// Attributes shared by all events.
    #[serde(flatten)]
    pub base: EventBase,
    /// The captured message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// One or more chained exceptions, the outermost last.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<Values<Exception>>,
    /// Threads that were running at the time of the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<Values<Thread>>,
}

impl ErrorEvent {
    /// Creates an event for a message.
    ///
    /// The message is truncated to [`MAX_MESSAGE_SIZE_IN_BYTES`].
    pub fn from_message(message: impl Into<String>) -> Self {
        let mut event = Self::default();
        event.set_message(message);
        event
    }

    /// Creates an event for a chain of exceptions, the outermost last.
    pub fn from_exceptions(exceptions: Vec<Exception>) -> Self {
        let mut event = Self::default();
        event.base.level = Some(Level::Error);
        event.exception = Some(Values::new(exceptions));
        event
    }

    /// Sets the message, truncating it to [`MAX_MESSAGE_SIZE_IN_BYTES`].
    pub fn set_message(&mut self, message: impl Into<String>) {
        let mut message = message.into();
        truncate_at_char_boundary(&mut message, MAX_MESSAGE_SIZE_IN_BYTES);
        self.message = Some(message);
    }
}

fn truncate_at_char_boundary(string: &mut String, max_len: usize) {
    if string.len() <= max_len {
        return;
    }

    let mut index = max_len;
    while !string.is_char_boundary(index) {
        index -= 1;
    }

    string.truncate(index);
}
