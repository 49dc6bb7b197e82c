use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use beacon_protocol::{
    Attachment, Breadcrumb, BreadcrumbBuffer, DynamicSamplingContext, Event, User,
};
use serde_json::Value;

use crate::hooks::{EventProcessor, Hint, HookError};

/// Contextual data applied to every event captured with it.
///
/// Values set on the event itself take precedence over values of the scope.
#[derive(Clone, Default)]
pub struct Scope {
    tags: BTreeMap<String, String>,
    contexts: BTreeMap<String, Value>,
    extra: BTreeMap<String, Value>,
    user: Option<User>,
    transaction: Option<String>,
    breadcrumbs: BreadcrumbBuffer,
    attachments: Vec<Attachment>,
    dynamic_sampling_context: Option<DynamicSamplingContext>,
    event_processors: Vec<EventProcessor>,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty scope holding at most `max_breadcrumbs` breadcrumbs.
    pub fn with_max_breadcrumbs(max_breadcrumbs: usize) -> Self {
        Self {
            breadcrumbs: BreadcrumbBuffer::new(max_breadcrumbs),
            ..Self::default()
        }
    }

    /// Sets a tag.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Sets a context.
    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.contexts.insert(key.into(), value.into());
    }

    /// Sets an extra value.
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.extra.insert(key.into(), value.into());
    }

    /// Sets the user.
    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user;
    }

    /// Sets the transaction name for events that have none.
    pub fn set_transaction(&mut self, transaction: Option<String>) {
        self.transaction = transaction;
    }

    /// Sets the trace metadata propagated with events.
    pub fn set_dynamic_sampling_context(&mut self, dsc: Option<DynamicSamplingContext>) {
        self.dynamic_sampling_context = dsc;
    }

    /// Records a breadcrumb, evicting the oldest one at capacity.
    pub fn add_breadcrumb(&mut self, breadcrumb: Breadcrumb) {
        self.breadcrumbs.record(breadcrumb);
    }

    /// Adds an attachment sent with every event.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    /// Registers an event processor. Processors run in registration order.
    pub fn add_event_processor<F>(&mut self, processor: F)
    where
        F: Fn(Event, &Hint) -> Result<Option<Event>, HookError> + Send + Sync + 'static,
    {
        self.event_processors.push(Arc::new(processor));
    }

    /// Returns the recorded breadcrumbs.
    pub fn breadcrumbs(&self) -> &BreadcrumbBuffer {
        &self.breadcrumbs
    }

    /// Removes all data and processors.
    pub fn clear(&mut self) {
        let capacity = self.breadcrumbs.capacity();
        *self = Self::with_max_breadcrumbs(capacity);
    }

    /// Merges the scope into the event and runs all event processors.
    ///
    /// Returns `None` as soon as a processor drops the event. Raw payloads are not enriched, but
    /// still pass through the processors.
    pub fn apply_to_event(
        &self,
        mut event: Event,
        hint: &Hint,
    ) -> Result<Option<Event>, HookError> {
        if let Some(base) = event.base_mut() {
            for (key, value) in &self.tags {
                base.tags.entry(key.clone()).or_insert_with(|| value.clone());
            }
            for (key, value) in &self.contexts {
                base.contexts
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
            for (key, value) in &self.extra {
                base.extra.entry(key.clone()).or_insert_with(|| value.clone());
            }

            if base.user.is_none() {
                base.user = self.user.clone();
            }
            if base.transaction.is_none() {
                base.transaction = self.transaction.clone();
            }
            if base.breadcrumbs.is_empty() {
                base.breadcrumbs.extend(&self.breadcrumbs);
            }
            if base.dynamic_sampling_context.is_none() {
                base.dynamic_sampling_context = self.dynamic_sampling_context.clone();
            }

            base.attachments.extend(self.attachments.iter().cloned());
        }

        for processor in &self.event_processors {
            match processor(event, hint)? {
                Some(processed) => event = processed,
                None => return Ok(None),
            }
        }

        Ok(Some(event))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("tags", &self.tags)
            .field("contexts", &self.contexts)
            .field("extra", &self.extra)
            .field("user", &self.user)
            .field("transaction", &self.transaction)
            .field("breadcrumbs", &self.breadcrumbs.len())
            .field("attachments", &self.attachments.len())
            .field("event_processors", &self.event_processors.len())
            .finish()
    }
}
