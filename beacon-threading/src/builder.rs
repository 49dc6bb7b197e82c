use std::any::Any;
use std::io;
use std::sync::Arc;

use crate::worker::BackgroundWorker;

/// Type alias for a thread safe closure that is used for panic handling across the code.
pub(crate) type PanicHandler = dyn Fn(Option<&str>, Box<dyn Any + Send>) + Send + Sync;

/// Selects how jobs are dispatched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DispatchStrategy {
    /// Jobs run inline on the calling thread.
    Synchronous,
    /// Jobs are queued and run on a fixed number of worker threads.
    Pooled {
        /// Number of worker threads.
        threads: usize,
        /// Maximum number of jobs waiting in the queue.
        max_queue: usize,
    },
}

impl DispatchStrategy {
    /// Selects a strategy from configured sizes.
    ///
    /// A thread count or queue size of zero selects [`DispatchStrategy::Synchronous`].
    pub fn new(threads: usize, max_queue: usize) -> Self {
        if threads == 0 || max_queue == 0 {
            Self::Synchronous
        } else {
            Self::Pooled { threads, max_queue }
        }
    }

    /// Returns `true` for [`DispatchStrategy::Synchronous`].
    pub fn is_synchronous(&self) -> bool {
        matches!(self, Self::Synchronous)
    }
}

/// [`WorkerBuilder`] configures and builds a [`BackgroundWorker`].
///
/// This builder enables you to customize thread naming and the panic handling strategy on top of
/// the [`DispatchStrategy`].
pub struct WorkerBuilder {
    pub(crate) strategy: DispatchStrategy,
    pub(crate) thread_name: Option<Box<dyn FnMut(usize) -> String>>,
    pub(crate) panic_handler: Option<Arc<PanicHandler>>,
    pub(crate) debug: bool,
}

impl WorkerBuilder {
    /// Initializes a new [`WorkerBuilder`] with default settings.
    pub fn new(strategy: DispatchStrategy) -> Self {
        Self {
            strategy,
            thread_name: None,
            panic_handler: None,
            debug: false,
        }
    }

    /// Specifies a custom naming convention for threads of the [`BackgroundWorker`].
    ///
    /// The provided closure receives the thread's index and returns a name.
    pub fn thread_name<F>(mut self, thread_name: F) -> Self
    where
        F: FnMut(usize) -> String + 'static,
    {
        self.thread_name = Some(Box::new(thread_name));
        self
    }

    /// Sets a custom panic handler for jobs.
    ///
    /// The handler receives the name of the thread, if any, and the panic payload. Without a
    /// custom handler, panics are logged as errors.
    pub fn panic_handler<F>(mut self, panic_handler: F) -> Self
    where
        F: Fn(Option<&str>, Box<dyn Any + Send>) + Send + Sync + 'static,
    {
        self.panic_handler = Some(Arc::new(panic_handler));
        self
    }

    /// Logs the full chain of causes when a job fails.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Constructs a [`BackgroundWorker`] and spawns its threads.
    pub fn build(self) -> io::Result<BackgroundWorker> {
        BackgroundWorker::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        assert_eq!(DispatchStrategy::new(0, 30), DispatchStrategy::Synchronous);
        assert_eq!(DispatchStrategy::new(2, 0), DispatchStrategy::Synchronous);
        assert_eq!(
            DispatchStrategy::new(2, 30),
            DispatchStrategy::Pooled {
                threads: 2,
                max_queue: 30
            }
        );
        assert!(!DispatchStrategy::new(1, 1).is_synchronous());
    }
}
