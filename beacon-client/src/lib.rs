//! The capture and delivery pipeline of the beacon telemetry client.
//!
//! A [`Client`] turns application events into envelopes and sends them to the collector
//! identified by a [`Dsn`](beacon_common::Dsn). Every captured event passes through these stages:
//!
//!  1. **Sampling**: error events are kept with the configured sample rate.
//!  2. **Scope**: a [`Scope`] merges contextual data into the event and runs its event processors.
//!  3. **Hooks**: `before_send` or `before_send_transaction` may modify or drop the event.
//!  4. **Dispatch**: the event is handed to an async callback, queued for the background worker,
//!     or sent on the calling thread.
//!  5. **Transport**: the [`Transport`](transport::Transport) builds the envelope, drops
//!     rate-limited and oversized items, and performs the HTTP request.
//!
//! Data dropped in any stage is counted by reason and category, and reported to the collector in a
//! client report attached to the next envelope.
//!
//! # Example
//!
//! ```no_run
//! use beacon_client::{Client, ClientOptions, Hint};
//! use beacon_config::Options;
//! use beacon_protocol::Level;
//!
//! let mut options = Options::default();
//! options.dsn = Some("https://public@collector.example.com/42".parse().unwrap());
//!
//! let client = Client::new(ClientOptions::new(options)).unwrap();
//! let event = client.event_from_message("disk is full", Some(Level::Warning));
//! client.capture_event(event, None, &Hint::default());
//! client.close(std::time::Duration::from_secs(2));
//! ```

#![warn(missing_docs)]

mod client;
mod client_report;
mod hooks;
mod scope;

pub mod constants;
pub mod envelope;
pub mod transport;

#[cfg(test)]
mod testutils;

pub use self::client::*;
pub use self::client_report::*;
pub use self::hooks::*;
pub use self::scope::*;
