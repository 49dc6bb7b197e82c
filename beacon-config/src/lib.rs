//! Configuration for the beacon telemetry client.
//!
//! [`Options`] holds every value the capture pipeline reads: the destination [`Dsn`], sampling,
//! background dispatch sizing, and the HTTP [`TransportConfig`]. Options can be loaded from a YAML
//! file with [`Options::from_path`] or built in code:
//!
//! ```
//! use beacon_config::Options;
//!
//! let options = Options {
//!     dsn: "https://public@sentry.io/42".parse().ok(),
//!     sample_rate: Some(0.5),
//!     ..Options::default()
//! };
//!
//! assert!(options.sending_allowed());
//! ```
//!
//! [`Dsn`]: beacon_common::Dsn

#![warn(missing_docs)]

mod config;

pub use self::config::*;
