//! # Subscription Registry
//!
//! Source of truth for who receives what. Two indices are kept under one lock:
//!
//! - event type → subscriptions, ordered by descending priority (stable)
//! - subscriber → event types it is subscribed to, for unregistration
//!
//! Per-type lists are immutable `Arc<[_]>` values. Every mutation installs a
//! fresh list, so a snapshot handed to the posting engine is never changed
//! underneath it.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    event::EventType,
    subscriber::{HandlerBinding, SubscriberHandle, SubscriberId, ThreadMode},
    EventBusError, EventBusResult,
};

/// Copy-on-write snapshot of one event type's subscriptions.
pub type SubscriptionList = Arc<[Arc<Subscription>]>;

/// Active binding of one subscriber instance to one handler.
pub struct Subscription {
    subscriber: SubscriberHandle,
    binding: Arc<HandlerBinding>,
    priority: i32,
    active: AtomicBool,
}

impl Subscription {
    pub fn new(subscriber: SubscriberHandle, binding: Arc<HandlerBinding>, priority: i32) -> Self {
        Self {
            subscriber,
            binding,
            priority,
            active: AtomicBool::new(true),
        }
    }

    pub fn subscriber(&self) -> &SubscriberHandle {
        &self.subscriber
    }

    pub fn binding(&self) -> &HandlerBinding {
        &self.binding
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn event_type(&self) -> EventType {
        self.binding.event_type()
    }

    pub fn thread_mode(&self) -> ThreadMode {
        self.binding.thread_mode()
    }

    /// False once unregistration of the subscriber has started.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn same_target(&self, other: &Subscription) -> bool {
        self.subscriber == other.subscriber
            && self.event_type() == other.event_type()
            && self.thread_mode() == other.thread_mode()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subscriber", &self.subscriber)
            .field("binding", &self.binding)
            .field("priority", &self.priority)
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    subscriptions_by_event_type: HashMap<EventType, SubscriptionList>,
    types_by_subscriber: HashMap<SubscriberId, Vec<EventType>>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `subscriber` to every binding at `priority`.
    ///
    /// All or nothing: if any binding is already subscribed for this
    /// subscriber, nothing is registered.
    pub fn subscribe_all(
        &self,
        subscriber: &SubscriberHandle,
        bindings: &[Arc<HandlerBinding>],
        priority: i32,
    ) -> EventBusResult<Vec<Arc<Subscription>>> {
        let mut state = self.state.lock();
        let mut staged: HashMap<EventType, Vec<Arc<Subscription>>> = HashMap::new();
        let mut created = Vec::with_capacity(bindings.len());

        for binding in bindings {
            let event_type = binding.event_type();
            let subscription = Arc::new(Subscription::new(
                subscriber.clone(),
                binding.clone(),
                priority,
            ));
            let list = staged.entry(event_type).or_insert_with(|| {
                state
                    .subscriptions_by_event_type
                    .get(&event_type)
                    .map(|current| current.to_vec())
                    .unwrap_or_default()
            });
            if list.iter().any(|existing| existing.same_target(&subscription)) {
                return Err(EventBusError::DuplicateSubscription {
                    subscriber: subscriber.type_name().to_string(),
                    event_type: event_type.to_string(),
                });
            }
            let position = list
                .iter()
                .position(|existing| subscription.priority > existing.priority)
                .unwrap_or(list.len());
            list.insert(position, subscription.clone());
            created.push(subscription);
        }

        let subscribed_types = state
            .types_by_subscriber
            .entry(subscriber.id())
            .or_default();
        for subscription in &created {
            subscribed_types.push(subscription.event_type());
        }
        for (event_type, list) in staged {
            state
                .subscriptions_by_event_type
                .insert(event_type, list.into());
        }
        debug!(
            subscriber = ?subscriber,
            count = created.len(),
            priority,
            "Subscribed"
        );
        Ok(created)
    }

    /// Removes every subscription of `subscriber`. Returns false if it was not
    /// registered.
    pub fn unsubscribe(&self, subscriber: SubscriberId) -> bool {
        let mut state = self.state.lock();
        let Some(subscribed_types) = state.types_by_subscriber.remove(&subscriber) else {
            warn!(
                subscriber = ?subscriber,
                "Subscriber to unregister was not registered before"
            );
            return false;
        };

        for event_type in subscribed_types {
            let Some(current) = state.subscriptions_by_event_type.get(&event_type) else {
                continue;
            };
            let mut remaining = Vec::with_capacity(current.len());
            for subscription in current.iter() {
                if subscription.subscriber.id() == subscriber {
                    subscription.deactivate();
                } else {
                    remaining.push(subscription.clone());
                }
            }
            if remaining.is_empty() {
                state.subscriptions_by_event_type.remove(&event_type);
            } else {
                state
                    .subscriptions_by_event_type
                    .insert(event_type, remaining.into());
            }
        }
        true
    }

    pub fn snapshot(&self, event_type: &EventType) -> Option<SubscriptionList> {
        self.state
            .lock()
            .subscriptions_by_event_type
            .get(event_type)
            .cloned()
    }

    pub fn is_registered(&self, subscriber: SubscriberId) -> bool {
        self.state
            .lock()
            .types_by_subscriber
            .contains_key(&subscriber)
    }

    pub fn has_subscriptions(&self, event_type: &EventType) -> bool {
        self.state
            .lock()
            .subscriptions_by_event_type
            .get(event_type)
            .is_some_and(|list| !list.is_empty())
    }
}
