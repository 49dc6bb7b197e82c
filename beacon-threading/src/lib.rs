//! # Beacon Threading
//!
//! A bounded job queue consumed by a fixed pool of worker threads. It decouples event production
//! from network I/O: producers hand over a job and return immediately, while the workers perform
//! the blocking HTTP exchange.
//!
//! - **Bounded**: [`BackgroundWorker::enqueue`] never blocks. When the queue is at capacity the
//!   job is handed back to the caller as rejected, so the caller can account for the loss.
//! - **Isolated**: a failing or panicking job is logged and does not affect the worker thread or
//!   other queued jobs.
//! - **Best-effort shutdown**: [`BackgroundWorker::shutdown`] stops accepting jobs and waits for
//!   the queue to drain until a deadline.
//!
//! A thread count or queue size of zero selects [`DispatchStrategy::Synchronous`], which runs
//! every job inline on the caller.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::time::Duration;
//! use beacon_threading::{DispatchStrategy, WorkerBuilder};
//!
//! let worker = WorkerBuilder::new(DispatchStrategy::new(2, 30))
//!     .thread_name(|index| format!("beacon-worker-{index}"))
//!     .build()
//!     .expect("failed to build background worker");
//!
//! let accepted = worker.enqueue(Box::new(|| {
//!     // Place the blocking work here.
//!     Ok(())
//! }));
//!
//! assert!(accepted);
//! worker.shutdown(Duration::from_secs(1));
//! ```

#![warn(missing_docs)]

mod builder;
mod worker;

pub use self::builder::*;
pub use self::worker::*;
