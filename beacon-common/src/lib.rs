//! Common types and utilities shared by the beacon crates.
//!
//! This crate holds the [`DataCategory`] classification used by rate limits and client reports,
//! and the [`Dsn`] that identifies where data is sent.

#![warn(missing_docs)]

mod data_category;
mod dsn;
mod macros;

pub use self::data_category::*;
pub use self::dsn::*;
