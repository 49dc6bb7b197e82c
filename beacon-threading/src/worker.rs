use std::any::Any;
use std::error::Error;
use std::fmt;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use beacon_log::ErrorChain;
use parking_lot::Mutex;

use crate::builder::{DispatchStrategy, PanicHandler, WorkerBuilder};

/// The error type returned by failing jobs.
pub type JobError = Box<dyn Error + Send + Sync>;

/// A unit of work executed by the [`BackgroundWorker`].
pub type Job = Box<dyn FnOnce() -> Result<(), JobError> + Send + 'static>;

/// Queue state of a pooled worker.
#[derive(Debug)]
struct Pool {
    /// Sender of the job queue, emptied on shutdown.
    tx: Mutex<Option<flume::Sender<Job>>>,
    done_rx: flume::Receiver<()>,
    num_threads: usize,
}

/// A bounded job queue with a fixed pool of worker threads.
///
/// [`BackgroundWorker`] accepts jobs from any number of threads. In pooled mode, jobs are processed
/// in FIFO order by the next available thread, so jobs may complete out of order when more than
/// one thread is configured.
pub struct BackgroundWorker {
    pool: Option<Pool>,
    panic_handler: Option<Arc<PanicHandler>>,
    debug: bool,
}

impl fmt::Debug for BackgroundWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("pool", &self.pool)
            .field("panic_handler", &self.panic_handler.is_some())
            .field("debug", &self.debug)
            .finish()
    }
}

impl BackgroundWorker {
    /// Constructs a new [`BackgroundWorker`] using the configuration specified by
    /// [`WorkerBuilder`].
    pub fn new(mut builder: WorkerBuilder) -> io::Result<Self> {
        let (threads, max_queue) = match builder.strategy {
            DispatchStrategy::Synchronous => {
                return Ok(Self {
                    pool: None,
                    panic_handler: builder.panic_handler,
                    debug: builder.debug,
                });
            }
            DispatchStrategy::Pooled { threads, max_queue } => (threads, max_queue),
        };

        let (tx, rx) = flume::bounded::<Job>(max_queue);
        let (done_tx, done_rx) = flume::unbounded();

        for index in 0..threads {
            let thread = Thread {
                name: builder.thread_name.as_mut().map(|f| f(index)),
                rx: rx.clone(),
                done_tx: done_tx.clone(),
                panic_handler: builder.panic_handler.clone(),
                debug: builder.debug,
            };

            let mut b = std::thread::Builder::new();
            if let Some(name) = thread.name.as_deref() {
                b = b.name(name.to_owned());
            }
            b.spawn(|| thread.run())?;
        }

        Ok(Self {
            pool: Some(Pool {
                tx: Mutex::new(Some(tx)),
                done_rx,
                num_threads: threads,
            }),
            panic_handler: builder.panic_handler,
            debug: builder.debug,
        })
    }

    /// Returns the strategy this worker dispatches with.
    pub fn is_synchronous(&self) -> bool {
        self.pool.is_none()
    }

    /// Hands a job to the worker without blocking.
    ///
    /// Returns `false` if the queue is at capacity or the worker has been shut down. The job is
    /// dropped in that case. In synchronous mode, the job runs on the calling thread and this
    /// always returns `true`.
    pub fn enqueue(&self, job: Job) -> bool {
        let Some(ref pool) = self.pool else {
            run_job(None, self.panic_handler.as_deref(), self.debug, job);
            return true;
        };

        let Some(tx) = pool.tx.lock().clone() else {
            beacon_log::debug!("background worker is shut down, rejecting job");
            return false;
        };

        match tx.try_send(job) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(_)) => {
                beacon_log::debug!("background worker queue is full, rejecting job");
                false
            }
            Err(flume::TrySendError::Disconnected(_)) => false,
        }
    }

    /// Returns the number of jobs waiting in the queue.
    pub fn queue_len(&self) -> usize {
        match self.pool {
            Some(ref pool) => pool.tx.lock().as_ref().map_or(0, |tx| tx.len()),
            None => 0,
        }
    }

    /// Stops accepting jobs and waits for queued jobs to finish until `timeout` elapses.
    ///
    /// Returns `true` if all threads finished in time. Jobs still queued after the deadline keep
    /// running on the detached threads and are lost if the process exits.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let Some(ref pool) = self.pool else {
            return true;
        };

        // Dropping the last sender lets threads exit after draining the queue.
        let Some(tx) = pool.tx.lock().take() else {
            return true;
        };
        drop(tx);

        let deadline = Instant::now() + timeout;
        for _ in 0..pool.num_threads {
            if pool.done_rx.recv_deadline(deadline).is_err() {
                beacon_log::debug!("background worker did not drain before shutdown deadline");
                return false;
            }
        }

        true
    }
}

/// A dedicated thread of a [`BackgroundWorker`].
struct Thread {
    name: Option<String>,
    rx: flume::Receiver<Job>,
    done_tx: flume::Sender<()>,
    panic_handler: Option<Arc<PanicHandler>>,
    debug: bool,
}

impl Thread {
    /// Runs jobs until the queue is closed and drained.
    fn run(self) {
        for job in self.rx.iter() {
            run_job(
                self.name.as_deref(),
                self.panic_handler.as_deref(),
                self.debug,
                job,
            );
        }

        self.done_tx.send(()).ok();
    }
}

/// Runs a single job, logging its error and routing a panic to the handler.
fn run_job(name: Option<&str>, panic_handler: Option<&PanicHandler>, debug: bool, job: Job) {
    match std::panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            let chain = ErrorChain(error.as_ref(), debug);
            beacon_log::error!("background worker job failed: {}", chain);
        }
        Err(payload) => match panic_handler {
            Some(panic_handler) => panic_handler(name, payload),
            None => log_panic(name, payload),
        },
    }
}

fn log_panic(name: Option<&str>, payload: Box<dyn Any + Send>) {
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<unknown>");

    beacon_log::error!(
        "thread in background worker {} panicked: {message}",
        name.unwrap_or("<unnamed>")
    );
}
