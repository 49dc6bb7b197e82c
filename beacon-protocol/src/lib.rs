//! The data model of events captured by the beacon client.
//!
//! Events are plain Rust structures that serialize into the JSON payloads expected by the
//! collector. Every captured event is wrapped in the [`Event`] union, which the client pipeline
//! uses to dispatch on the kind of event without inspecting how it was built:
//!
//!  - [`ErrorEvent`]: messages and exceptions, sent as `event` items.
//!  - [`TransactionEvent`]: a root [`Span`] and its children, sent as `transaction` items.
//!  - [`CheckInEvent`]: monitor check-ins, sent as `check_in` items.
//!  - [`Event::Raw`]: an untyped payload returned by legacy hooks and passed through verbatim.
//!
//! Log records ([`LogEvent`]) are not events. They are batched by the client and sent in a single
//! `log` item.
//!
//! # Example
//!
//! ```
//! use beacon_protocol::{ErrorEvent, Event, Level};
//!
//! let mut event = ErrorEvent::from_message("disk is full");
//! event.base.level = Some(Level::Warning);
//! event.base.tags.insert("mount".to_owned(), "/var".to_owned());
//!
//! let event = Event::from(event);
//! let json = event.to_json().unwrap();
//! assert_eq!(json["type"], "event");
//! assert_eq!(json["message"], "disk is full");
//! ```

#![warn(missing_docs)]

mod attachment;
mod breadcrumb;
mod checkin;
mod client_report;
mod error_event;
mod event;
mod exception;
mod ids;
mod log;
mod transaction;
mod types;

pub use self::attachment::*;
pub use self::breadcrumb::*;
pub use self::checkin::*;
pub use self::client_report::*;
pub use self::error_event::*;
pub use self::event::*;
pub use self::exception::*;
pub use self::ids::*;
pub use self::log::*;
pub use self::transaction::*;
pub use self::types::*;
