use std::{fmt, sync::Arc};

use super::{EventRef, Hierarchy};
use crate::{event_bus::WeakEventBus, subscriber::SubscriberHandle};

/// Posted when a handler fails, if `send_subscriber_exception_event` is set.
///
/// Failures of handlers for this event are only logged, never re-posted.
#[derive(Clone)]
pub struct SubscriberExceptionEvent {
    /// Bus the failing handler was registered with.
    pub event_bus: WeakEventBus,
    pub cause: Arc<dyn std::error::Error + Send + Sync>,
    pub causing_event: EventRef,
    pub causing_subscriber: SubscriberHandle,
}

impl Hierarchy for SubscriberExceptionEvent {}

impl fmt::Debug for SubscriberExceptionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberExceptionEvent")
            .field("cause", &self.cause.to_string())
            .field("causing_event", &self.causing_event)
            .field("causing_subscriber", &self.causing_subscriber)
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

/// Posted when an event matched no subscription, if `send_no_subscriber_event`
/// is set.
#[derive(Debug, Clone)]
pub struct NoSubscriberEvent {
    pub event_bus: WeakEventBus,
    pub original_event: EventRef,
}

impl Hierarchy for NoSubscriberEvent {}
