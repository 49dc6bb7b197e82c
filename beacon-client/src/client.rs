use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use beacon_common::DataCategory;
use beacon_config::Options;
use beacon_log::ErrorChain;
use beacon_protocol::{
    AttributeValue, BreadcrumbBuffer, CheckInEvent, CheckInStatus, ClientSdkInfo, DiscardReason,
    ErrorEvent, Event, EventBase, Exception, Level, LogEvent, LogLevel, SDK_NAME, SDK_VERSION,
    TransactionEvent,
};
use beacon_threading::{BackgroundWorker, DispatchStrategy, JobError, WorkerBuilder};
use parking_lot::Mutex;

use crate::envelope::Envelope;
use crate::hooks::{AsyncCallback, BeforeSend, BeforeSendResult, Hint, HookError};
use crate::scope::Scope;
use crate::transport::{Transport, TransportError, Upstream};

/// Returns a uniformly distributed value in `0.0..1.0` for sampling decisions.
pub type Sampler = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Errors returned by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An application callback failed.
    #[error("event hook failed")]
    Hook(#[source] HookError),
    /// The event could not be delivered.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The event could not be serialized for the async callback.
    #[error("failed to serialize event")]
    Serialize(#[from] serde_json::Error),
    /// The background worker threads could not be spawned.
    #[error("failed to start background worker")]
    Worker(#[source] io::Error),
}

/// Options of a [`Client`], including callbacks that cannot be loaded from configuration.
#[derive(Clone)]
pub struct ClientOptions {
    /// Options loaded from configuration.
    pub options: Options,
    /// Invoked with error events and check-ins before they are sent.
    pub before_send: Option<BeforeSend>,
    /// Invoked with transactions before they are sent.
    pub before_send_transaction: Option<BeforeSend>,
    /// Takes over delivery of events from the client.
    pub async_callback: Option<AsyncCallback>,
    /// Source of randomness for sampling.
    pub sampler: Sampler,
}

impl ClientOptions {
    /// Creates client options without callbacks.
    pub fn new(options: Options) -> Self {
        Self {
            options,
            before_send: None,
            before_send_transaction: None,
            async_callback: None,
            sampler: Arc::new(rand::random::<f64>),
        }
    }

    /// Sets the hook invoked with error events and check-ins.
    pub fn before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(Event, &Hint) -> Result<BeforeSendResult, HookError> + Send + Sync + 'static,
    {
        self.before_send = Some(Arc::new(hook));
        self
    }

    /// Sets the hook invoked with transactions.
    pub fn before_send_transaction<F>(mut self, hook: F) -> Self
    where
        F: Fn(Event, &Hint) -> Result<BeforeSendResult, HookError> + Send + Sync + 'static,
    {
        self.before_send_transaction = Some(Arc::new(hook));
        self
    }

    /// Sets a callback that takes over delivery.
    pub fn async_callback(mut self, callback: AsyncCallback) -> Self {
        self.async_callback = Some(callback);
        self
    }

    /// Replaces the source of randomness for sampling.
    pub fn sampler<F>(mut self, sampler: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.sampler = Arc::new(sampler);
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("options", &self.options)
            .field("before_send", &self.before_send.is_some())
            .field(
                "before_send_transaction",
                &self.before_send_transaction.is_some(),
            )
            .field("async_callback", &self.async_callback)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct ClientInner {
    options: ClientOptions,
    transport: Option<Arc<Transport>>,
    worker: BackgroundWorker,
    logs: Mutex<Vec<LogEvent>>,
}

/// Captures events and hands them to the transport.
///
/// Every captured event passes through sampling, the scope and its event processors, and the
/// before-send hooks, in this order. It is then handed to the async callback, queued for the
/// background worker, or sent on the calling thread. Events dropped along the way are recorded
/// as discarded and reported to the collector with the next envelope.
///
/// The client is cheap to clone. All clones share the same transport and worker.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a client that sends over HTTP.
    ///
    /// Without a DSN, or if sending is disabled, the client drops all events.
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let transport = match options.options.dsn {
            Some(ref dsn) if options.options.sending_allowed() => {
                Some(Arc::new(Transport::http(dsn.clone(), &options.options)?))
            }
            _ => None,
        };

        Self::with_transport(options, transport)
    }

    /// Creates a client that sends through a custom upstream.
    pub fn with_upstream(
        options: ClientOptions,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, ClientError> {
        let transport = match options.options.dsn {
            Some(ref dsn) if options.options.sending_allowed() => Some(Arc::new(Transport::new(
                dsn.clone(),
                &options.options,
                upstream,
            ))),
            _ => None,
        };

        Self::with_transport(options, transport)
    }

    fn with_transport(
        options: ClientOptions,
        transport: Option<Arc<Transport>>,
    ) -> Result<Self, ClientError> {
        let strategy = DispatchStrategy::new(
            options.options.background_worker_threads,
            options.options.background_worker_max_queue,
        );

        let worker = WorkerBuilder::new(strategy)
            .thread_name(|index| format!("beacon-worker-{index}"))
            .debug(options.options.debug)
            .build()
            .map_err(ClientError::Worker)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                options,
                transport,
                worker,
                logs: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Returns the options of this client.
    pub fn options(&self) -> &Options {
        &self.inner.options.options
    }

    /// Returns the transport, or `None` if sending is not allowed.
    pub fn transport(&self) -> Option<&Arc<Transport>> {
        if !self.options().sending_allowed() {
            return None;
        }

        self.inner.transport.as_ref()
    }

    /// Captures an event and dispatches it.
    ///
    /// Returns the dispatched event, which may have been modified by event processors and hooks.
    /// Returns `None` if the event was discarded or capturing failed. Failures are logged and never
    /// returned to the caller.
    pub fn capture_event(&self, event: Event, scope: Option<&Scope>, hint: &Hint) -> Option<Event> {
        let transport = self.transport()?;

        match self.process_and_dispatch(transport, event, scope, hint) {
            Ok(event) => event,
            Err(error) => {
                beacon_log::error!(
                    "event capturing failed: {}",
                    ErrorChain(&error, self.options().debug)
                );
                None
            }
        }
    }

    /// Sends an event on the calling thread.
    ///
    /// Only the before-send hooks are applied. Unlike [`capture_event`](Self::capture_event),
    /// delivery failures and hook errors are returned.
    pub fn send_event(&self, event: Event, hint: &Hint) -> Result<Option<Event>, ClientError> {
        let Some(transport) = self.transport() else {
            return Ok(None);
        };

        let Some(event) = self.apply_before_send(transport, event, hint)? else {
            return Ok(None);
        };

        deliver(transport, &event)?;
        Ok(Some(event))
    }

    /// Sends an envelope on the calling thread.
    ///
    /// If sending fails, all items are recorded as discarded.
    pub fn send_envelope(&self, envelope: Envelope) -> Result<(), ClientError> {
        let Some(transport) = self.transport() else {
            return Ok(());
        };

        send_envelope(transport, envelope).map_err(ClientError::from)
    }

    fn process_and_dispatch(
        &self,
        transport: &Arc<Transport>,
        event: Event,
        scope: Option<&Scope>,
        hint: &Hint,
    ) -> Result<Option<Event>, ClientError> {
        let Some(event) = self.process_event(transport, event, scope, hint)? else {
            return Ok(None);
        };

        self.dispatch(transport, event, hint)
    }

    /// Applies sampling, the scope and the before-send hooks.
    fn process_event(
        &self,
        transport: &Transport,
        event: Event,
        scope: Option<&Scope>,
        hint: &Hint,
    ) -> Result<Option<Event>, ClientError> {
        // Transactions are sampled when they start, check-ins are never sampled.
        if matches!(event, Event::Error(_)) && !self.sample() {
            beacon_log::debug!("discarded event because of sample rate");
            transport.record_lost_event(DiscardReason::SampleRate, DataCategory::Error, 0);
            return Ok(None);
        }

        let category = event.data_category();
        let spans_before = event.span_count();

        let event = match scope {
            Some(scope) => match scope.apply_to_event(event, hint).map_err(ClientError::Hook)? {
                Some(event) => event,
                None => {
                    beacon_log::debug!(
                        "discarded event because one of the event processors returned none"
                    );
                    transport.record_lost_event(
                        DiscardReason::EventProcessor,
                        category,
                        spans_before,
                    );
                    return Ok(None);
                }
            },
            None => event,
        };

        record_dropped_spans(transport, DiscardReason::EventProcessor, spans_before, &event);
        self.apply_before_send(transport, event, hint)
    }

    /// Returns `true` if an error event is kept by the sample rate.
    ///
    /// The event is kept if the random draw is strictly below the rate.
    fn sample(&self) -> bool {
        match self.options().sample_rate {
            Some(sample_rate) => (self.inner.options.sampler)() < sample_rate,
            None => true,
        }
    }

    fn apply_before_send(
        &self,
        transport: &Transport,
        event: Event,
        hint: &Hint,
    ) -> Result<Option<Event>, ClientError> {
        let (hook, name) = if event.is_transaction() {
            (
                &self.inner.options.before_send_transaction,
                "before_send_transaction",
            )
        } else {
            (&self.inner.options.before_send, "before_send")
        };

        let Some(hook) = hook else {
            return Ok(Some(event));
        };

        let category = event.data_category();
        let spans_before = event.span_count();

        match hook(event, hint).map_err(ClientError::Hook)? {
            BeforeSendResult::Unchanged(event) => {
                record_dropped_spans(transport, DiscardReason::BeforeSend, spans_before, &event);
                Ok(Some(event))
            }
            BeforeSendResult::Discarded => {
                beacon_log::debug!("discarded event because {name} returned none");
                transport.record_lost_event(DiscardReason::BeforeSend, category, spans_before);
                Ok(None)
            }
            BeforeSendResult::LegacyRaw(payload) => {
                beacon_log::warn!("returning a raw payload from {name} is deprecated");
                Ok(Some(Event::Raw(payload)))
            }
        }
    }

    fn dispatch(
        &self,
        transport: &Arc<Transport>,
        event: Event,
        hint: &Hint,
    ) -> Result<Option<Event>, ClientError> {
        if let Some(ref callback) = self.inner.options.async_callback {
            let payload = transport.event_to_json(&event)?;
            if let Err(error) = callback.call(payload, hint) {
                beacon_log::error!(
                    "async event sending failed: {}",
                    ErrorChain(error.as_ref(), transport.debug())
                );
                deliver(transport, &event)?;
            }
            return Ok(Some(event));
        }

        if !self.inner.worker.is_synchronous() && hint.background != Some(false) {
            let job_transport = Arc::clone(transport);
            let job_event = event.clone();

            let queued = self.inner.worker.enqueue(Box::new(move || {
                // Failures are logged and recorded by `deliver`.
                deliver(&job_transport, &job_event).ok();
                Ok(())
            }));

            if !queued {
                beacon_log::debug!("discarded event because the background worker queue is full");
                transport.record_lost_event(
                    DiscardReason::QueueOverflow,
                    event.data_category(),
                    event.span_count(),
                );
                return Ok(None);
            }

            return Ok(Some(event));
        }

        deliver(transport, &event)?;
        Ok(Some(event))
    }

    /// Fills attributes from the options that the event does not set itself.
    fn prepare_base(&self, base: &mut EventBase) {
        let options = self.options();

        if base.release.is_none() {
            base.release = options.release.clone();
        }
        if base.environment.is_none() {
            base.environment = Some(options.environment.clone());
        }
        if base.server_name.is_none() {
            base.server_name = options.server_name.clone();
        }
        if base.sdk.is_none() {
            base.sdk = Some(ClientSdkInfo::beacon());
        }
        if base.breadcrumbs.is_empty() {
            base.breadcrumbs = BreadcrumbBuffer::new(options.max_breadcrumbs);
        }
    }

    /// Creates an event for a message.
    pub fn event_from_message(&self, message: impl Into<String>, level: Option<Level>) -> Event {
        let mut event = ErrorEvent::from_message(message);
        event.base.level = level;
        self.prepare_base(&mut event.base);
        event.into()
    }

    /// Creates an event for a chain of exceptions, the outermost last.
    pub fn event_from_exception(&self, exceptions: Vec<Exception>) -> Event {
        let mut event = ErrorEvent::from_exceptions(exceptions);
        self.prepare_base(&mut event.base);
        event.into()
    }

    /// Creates a check-in event.
    pub fn event_from_check_in(
        &self,
        monitor_slug: impl Into<String>,
        status: CheckInStatus,
        duration: Option<f64>,
    ) -> Event {
        let mut check_in = CheckInEvent::new(monitor_slug, status);
        check_in.duration = duration;
        self.prepare_base(&mut check_in.base);
        check_in.into()
    }

    /// Creates an event for a finished transaction.
    pub fn event_from_transaction(&self, mut transaction: TransactionEvent) -> Event {
        self.prepare_base(&mut transaction.base);
        transaction.into()
    }

    /// Creates a log record from a template with `%s` placeholders.
    pub fn event_from_log(
        &self,
        level: LogLevel,
        template: &str,
        parameters: Vec<AttributeValue>,
    ) -> LogEvent {
        let options = self.options();
        let mut log = LogEvent::from_template(level, template, parameters);

        log.set_attribute("sentry.environment", options.environment.as_str());
        if let Some(ref release) = options.release {
            log.set_attribute("sentry.release", release.as_str());
        }
        log.set_attribute("sentry.sdk.name", SDK_NAME);
        log.set_attribute("sentry.sdk.version", SDK_VERSION);

        log
    }

    /// Buffers a log record.
    ///
    /// The buffer is sent as a single envelope once it holds `max_log_events` records.
    pub fn capture_log(&self, log: LogEvent) {
        if !self.options().enable_logs || self.transport().is_none() {
            return;
        }

        let logs = {
            let mut buffer = self.inner.logs.lock();
            buffer.push(log);
            if buffer.len() < self.options().max_log_events {
                return;
            }
            std::mem::take(&mut *buffer)
        };

        self.dispatch_logs(logs);
    }

    /// Sends buffered log records through the worker.
    fn dispatch_logs(&self, logs: Vec<LogEvent>) {
        let Some(transport) = self.transport() else {
            return;
        };

        if logs.is_empty() {
            return;
        }

        let count = logs.len() as u64;
        let job_transport = Arc::clone(transport);
        let queued = self.inner.worker.enqueue(Box::new(move || -> Result<(), JobError> {
            let envelope = job_transport.envelope_from_logs(&logs)?;
            send_envelope(&job_transport, envelope).ok();
            Ok(())
        }));

        if !queued {
            transport.client_reports().record(
                DiscardReason::QueueOverflow,
                DataCategory::Log,
                count,
            );
        }
    }

    /// Sends buffered log records and the pending client report.
    pub fn flush(&self) -> Result<(), ClientError> {
        let logs = std::mem::take(&mut *self.inner.logs.lock());
        self.dispatch_logs(logs);

        match self.transport() {
            Some(transport) => transport.flush().map_err(ClientError::from),
            None => Ok(()),
        }
    }

    /// Flushes pending data and waits for the background worker to drain until `timeout`.
    ///
    /// Returns `true` if all queued events were sent in time. The client stops accepting events
    /// for background delivery.
    pub fn close(&self, timeout: Duration) -> bool {
        if let Err(error) = self.flush() {
            beacon_log::error!(
                "flushing client failed: {}",
                ErrorChain(&error, self.options().debug)
            );
        }

        self.inner.worker.shutdown(timeout)
    }
}

/// Records spans removed by a processor or hook.
fn record_dropped_spans(
    transport: &Transport,
    reason: DiscardReason,
    spans_before: usize,
    event: &Event,
) {
    let dropped = spans_before.saturating_sub(event.span_count());
    transport
        .client_reports()
        .record(reason, DataCategory::Span, dropped as u64);
}

/// Sends an event, logging and recording failures.
fn deliver(transport: &Transport, event: &Event) -> Result<(), TransportError> {
    transport.send_event(event).inspect_err(|error| {
        beacon_log::error!(
            "event sending failed: {}",
            ErrorChain(error, transport.debug())
        );
        transport.record_lost_event(
            DiscardReason::NetworkError,
            event.data_category(),
            event.span_count(),
        );
    })
}

/// Sends an envelope, logging failures and recording all items as lost.
fn send_envelope(transport: &Transport, envelope: Envelope) -> Result<(), TransportError> {
    let quantities: Vec<_> = envelope
        .items()
        .map(|item| {
            let quantity = u64::from(item.item_count().unwrap_or(1));
            (item.data_category(), quantity, item.span_count() as u64)
        })
        .collect();

    transport.send_envelope(envelope).inspect_err(|error| {
        beacon_log::error!(
            "envelope sending failed: {}",
            ErrorChain(error, transport.debug())
        );
        let reports = transport.client_reports();
        for (category, quantity, spans) in quantities {
            reports.record(DiscardReason::NetworkError, category, quantity);
            reports.record(DiscardReason::NetworkError, DataCategory::Span, spans);
        }
    })
}
