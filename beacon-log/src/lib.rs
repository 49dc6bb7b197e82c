//! Logging facade for beacon.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The configuration
//! implements `serde` traits, so it can be obtained from configuration files. This requires the
//! `init` feature.
//!
//! ```
//! # #[cfg(feature = "init")] {
//! use beacon_log::LogConfig;
//!
//! let log_config = LogConfig {
//!     enable_backtraces: true,
//!     ..LogConfig::default()
//! };
//!
//! beacon_log::init(&log_config);
//! # }
//! ```
//!
//! # Logging
//!
//! The basic use of this crate is through the five logging macros: [`error!`], [`warn!`],
//! [`info!`], [`debug!`] and [`trace!`] where `error!` represents the highest-priority log messages
//! and `trace!` the lowest. Each of these macros accept format strings similarly to [`println!`].
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer short and precise log
//! messages over verbose text. Choose the log level according to these rules:
//!
//! - [`error!`] for failures that lose data, such as an event that could not be delivered.
//! - [`warn!`] for undesirable behavior, such as deprecated hook return values.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] for messages usually relevant to debugging, such as discarded events.
//! - [`trace!`] for full auxiliary information.
//!
//! ## Logging Error Types
//!
//! To log errors to the error stream, either attach them as a structured field or use the
//! [`LogError`] wrapper, which formats the error with all its causes. [`ErrorChain`] prints the
//! causes only if a debug flag is set.
//!
//! ```
//! use std::io::{Error, ErrorKind};
//! use beacon_log::LogError;
//!
//! let custom_error = Error::new(ErrorKind::Other, "oh no!");
//! beacon_log::error!(error = &custom_error as &dyn std::error::Error, "operation failed");
//! beacon_log::error!("operation failed: {}", LogError(&custom_error));
//! ```
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro [`init_test!`] that should be called
//! at the beginning of test method. It enables test mode of the logger and customizes log levels
//! for the current crate.
//!
//! ```
//! # #[cfg(feature = "test")] {
//! #[test]
//! fn test_something() {
//!     beacon_log::init_test!();
//! }
//! # }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{debug, enabled, error, event, info, trace, warn};
