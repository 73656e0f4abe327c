//! # Event Bus
//!
//! The [`EventBus`] is the entry point: subscribers register with it, producers
//! post to it, and it dispatches every event to the matching subscriptions.
//!
//! ## Posting
//!
//! Each thread has its own queue per bus. A post made while the thread is
//! already dispatching (for example from inside a handler) is queued behind
//! the events already waiting and delivered before the outermost `post`
//! returns:
//!
//! ```text
//! post(A) ─▶ queue [A] ─▶ drain ─▶ handler(A) ─▶ post(B) ─▶ queue [B]
//!                           │                                 │
//!                           └──────────── handler(B) ◀────────┘
//! ```
//!
//! ## Delivery
//!
//! Inline handlers run during the drain. Main thread, background and async
//! handlers may be deferred to their executor; a deferred delivery is dropped
//! if its subscriber was unregistered in the meantime.
//!
//! ## Failures
//!
//! A handler fails by returning `Err` or by panicking. Depending on
//! [`BusConfig`] the failure is logged, re-posted as a
//! [`SubscriberExceptionEvent`], and returned to the caller of the outermost
//! `post` as [`EventBusError::HandlerInvocationFailure`].

use std::{
    any::{type_name, Any},
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, OnceLock, Weak},
    time::Duration,
};

use tracing::{debug, error, trace};

use crate::{
    config::BusConfig,
    event::{
        clear_caches, lookup_all_event_types, same_event, Event, EventRef, EventType, Hierarchy,
        NoSubscriberEvent, SubscriberExceptionEvent,
    },
    executor::{LazyWorkerPool, MainThreadSupport, WorkerPool},
    poster::{
        AsyncPoster, BackgroundPoster, Delivery, MainThreadPoster, PendingPost, PendingPostPool,
    },
    posting::{BusId, DrainGuard, PostingStates, SharedPostingState},
    registry::{Subscription, SubscriptionRegistry},
    sticky::StickyStore,
    subscriber::{HandlerDiscovery, Subscriber, SubscriberHandle, SubscriberId, ThreadMode},
    EventBusError, EventBusResult, HandlerError,
};

static DEFAULT_BUS: OnceLock<EventBus> = OnceLock::new();

/// Central publish/subscribe hub. Cloning is cheap; clones share one bus.
#[derive(Clone)]
pub struct EventBus {
    core: Arc<BusCore>,
}

/// Non-owning handle to an [`EventBus`], carried by notification events.
#[derive(Clone)]
pub struct WeakEventBus {
    core: Weak<BusCore>,
}

impl WeakEventBus {
    /// The bus, unless it has been dropped.
    pub fn upgrade(&self) -> Option<EventBus> {
        self.core.upgrade().map(|core| EventBus { core })
    }

    pub fn refers_to(&self, bus: &EventBus) -> bool {
        std::ptr::eq(self.core.as_ptr(), Arc::as_ptr(&bus.core))
    }
}

impl fmt::Debug for WeakEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core.upgrade() {
            Some(core) => write!(f, "WeakEventBus({:?})", core.id),
            None => f.write_str("WeakEventBus(dropped)"),
        }
    }
}

struct BusCore {
    id: BusId,
    this: Weak<BusCore>,
    posting: PostingStates,
    config: BusConfig,
    registry: SubscriptionRegistry,
    sticky: StickyStore,
    discovery: HandlerDiscovery,
    pool: Arc<PendingPostPool>,
    main_thread: Option<Arc<dyn MainThreadSupport>>,
    main_poster: Option<MainThreadPoster>,
    background_poster: BackgroundPoster,
    async_poster: AsyncPoster,
}

impl EventBus {
    /// Creates a bus with the default configuration and no main thread.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// Process-wide instance, created on first use unless one was installed
    /// with [`EventBusBuilder::install_default`].
    pub fn get_default() -> EventBus {
        DEFAULT_BUS.get_or_init(EventBus::new).clone()
    }

    pub fn config(&self) -> &BusConfig {
        &self.core.config
    }

    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            core: Arc::downgrade(&self.core),
        }
    }

    /// Registers `subscriber` for all of its handlers at priority 0.
    pub fn register<S: Subscriber>(&self, subscriber: &Arc<S>) -> EventBusResult<()> {
        self.subscribe(subscriber, 0, false)
    }

    /// Registers `subscriber`; within one thread mode, higher priorities
    /// receive events first.
    pub fn register_with_priority<S: Subscriber>(
        &self,
        subscriber: &Arc<S>,
        priority: i32,
    ) -> EventBusResult<()> {
        self.subscribe(subscriber, priority, false)
    }

    /// Registers `subscriber` and immediately delivers matching sticky events.
    pub fn register_sticky<S: Subscriber>(&self, subscriber: &Arc<S>) -> EventBusResult<()> {
        self.subscribe(subscriber, 0, true)
    }

    pub fn register_sticky_with_priority<S: Subscriber>(
        &self,
        subscriber: &Arc<S>,
        priority: i32,
    ) -> EventBusResult<()> {
        self.subscribe(subscriber, priority, true)
    }

    fn subscribe<S: Subscriber>(
        &self,
        subscriber: &Arc<S>,
        priority: i32,
        sticky: bool,
    ) -> EventBusResult<()> {
        let bindings = self.core.discovery.find_handlers::<S>()?;
        let handle = SubscriberHandle::new(subscriber);
        let subscriptions = self
            .core
            .registry
            .subscribe_all(&handle, &bindings, priority)?;
        if sticky {
            self.core.deliver_sticky_events(&subscriptions)
        } else {
            Ok(())
        }
    }

    /// Removes every subscription of `subscriber`. Returns false if it was
    /// not registered.
    pub fn unregister<S: ?Sized>(&self, subscriber: &Arc<S>) -> bool {
        self.core.registry.unsubscribe(SubscriberId::of(subscriber))
    }

    pub fn is_registered<S: ?Sized>(&self, subscriber: &Arc<S>) -> bool {
        self.core.registry.is_registered(SubscriberId::of(subscriber))
    }

    /// Posts `event` to every matching subscription.
    pub fn post<E>(&self, event: E) -> EventBusResult<()>
    where
        E: Hierarchy + Send + Sync + fmt::Debug,
    {
        self.core.post_event(Arc::new(event))
    }

    /// Posts an already shared event.
    pub fn post_event(&self, event: EventRef) -> EventBusResult<()> {
        self.core.post_event(event)
    }

    /// Stores `event` as the sticky event of its type, then posts it.
    pub fn post_sticky<E>(&self, event: E) -> EventBusResult<()>
    where
        E: Hierarchy + Send + Sync + fmt::Debug,
    {
        self.post_sticky_event(Arc::new(event))
    }

    pub fn post_sticky_event(&self, event: EventRef) -> EventBusResult<()> {
        self.core.sticky.put(event.clone());
        self.core.post_event(event)
    }

    /// Stops delivery of the event being dispatched to the remaining
    /// subscriptions.
    ///
    /// Only valid from an inline handler on the posting thread, passing the
    /// event the handler received.
    pub fn cancel_event_delivery(&self, event: &dyn Event) -> EventBusResult<()> {
        self.core.cancel_event_delivery(event)
    }

    pub fn get_sticky_event<T>(&self) -> Option<Arc<T>>
    where
        T: Hierarchy + Send + Sync + fmt::Debug,
    {
        self.core
            .sticky
            .get(&EventType::of::<T>())
            .and_then(downcast_event::<T>)
    }

    pub fn get_sticky_event_of(&self, event_type: &EventType) -> Option<EventRef> {
        self.core.sticky.get(event_type)
    }

    /// Removes and returns the sticky event of type `T`.
    pub fn remove_sticky_event<T>(&self) -> Option<Arc<T>>
    where
        T: Hierarchy + Send + Sync + fmt::Debug,
    {
        self.core
            .sticky
            .remove_type(&EventType::of::<T>())
            .and_then(downcast_event::<T>)
    }

    pub fn remove_sticky_event_of(&self, event_type: &EventType) -> Option<EventRef> {
        self.core.sticky.remove_type(event_type)
    }

    /// Removes `event` if it is the stored sticky event of its type.
    pub fn remove_sticky_event_instance(&self, event: &dyn Event) -> bool {
        self.core.sticky.remove_if_same(event)
    }

    pub fn remove_all_sticky_events(&self) {
        self.core.sticky.clear();
    }

    pub fn has_subscriber_for_event<T: Hierarchy + ?Sized>(&self) -> bool {
        self.has_subscriber_for_event_type(&EventType::of::<T>())
    }

    pub fn has_subscriber_for_event_type(&self, event_type: &EventType) -> bool {
        self.core
            .event_types_for(event_type)
            .iter()
            .any(|event_type| self.core.registry.has_subscriptions(event_type))
    }

    /// Forgets cached handler lists and resolved event types. Existing
    /// subscriptions are unaffected.
    pub fn clear_caches(&self) {
        self.core.discovery.clear_cache();
        clear_caches();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("id", &self.core.id)
            .field("event_inheritance", &self.core.config.event_inheritance)
            .field("main_thread", &self.core.main_thread.is_some())
            .finish()
    }
}

fn downcast_event<T: Any + Send + Sync>(event: EventRef) -> Option<Arc<T>> {
    event.into_any_arc().downcast::<T>().ok()
}

impl BusCore {
    fn weak_handle(&self) -> WeakEventBus {
        WeakEventBus {
            core: self.this.clone(),
        }
    }

    fn is_main_thread(&self) -> bool {
        // Without a main thread every thread counts as main
        self.main_thread
            .as_ref()
            .map_or(true, |main_thread| main_thread.is_main_thread())
    }

    fn event_types_for(&self, event_type: &EventType) -> Arc<[EventType]> {
        if self.config.event_inheritance {
            lookup_all_event_types(event_type)
        } else {
            Arc::from([*event_type])
        }
    }

    fn post_event(&self, event: EventRef) -> EventBusResult<()> {
        let state = self.posting.current();
        let is_main_thread = {
            let mut current = state.borrow_mut();
            if current.is_posting {
                current.queue.push_back(event);
                return Ok(());
            }
            if current.canceled {
                return Err(EventBusError::internal("Abort state was not reset"));
            }
            current.queue.push_back(event);
            self.is_main_thread()
        };

        let _guard = DrainGuard::enter(state, is_main_thread);
        let mut first_failure = None;
        loop {
            let next = state.borrow_mut().queue.pop_front();
            let Some(event) = next else {
                break;
            };
            if let Err(e) = self.post_single_event(state, event) {
                first_failure.get_or_insert(e);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    fn post_single_event(&self, state: &SharedPostingState, event: EventRef) -> EventBusResult<()> {
        let event_type = event.event_type();
        let is_main_thread = state.borrow().is_main_thread;
        trace!(event_type = %event_type, "Posting event");

        let mut subscription_found = false;
        for matched_type in self.event_types_for(&event_type).iter() {
            let Some(subscriptions) = self.registry.snapshot(matched_type) else {
                continue;
            };
            if subscriptions.is_empty() {
                continue;
            }
            subscription_found = true;

            for subscription in subscriptions.iter() {
                if !subscription.is_active() {
                    continue;
                }
                state.borrow_mut().current = Some((event.clone(), subscription.clone()));
                let result = self.post_to_subscription(subscription, &event, is_main_thread);
                let canceled = {
                    let mut current = state.borrow_mut();
                    current.current = None;
                    std::mem::take(&mut current.canceled)
                };
                result?;
                if canceled {
                    trace!(event_type = %event_type, "Event delivery canceled");
                    return Ok(());
                }
            }
        }

        if !subscription_found {
            self.handle_no_subscriber(event, event_type);
        }
        Ok(())
    }

    fn handle_no_subscriber(&self, event: EventRef, event_type: EventType) {
        if self.config.log_no_subscriber_messages {
            debug!(event_type = %event_type, "No subscribers registered for event");
        }
        let is_notification =
            event.is::<NoSubscriberEvent>() || event.is::<SubscriberExceptionEvent>();
        if self.config.send_no_subscriber_event && !is_notification {
            let notification = NoSubscriberEvent {
                event_bus: self.weak_handle(),
                original_event: event,
            };
            if let Err(e) = self.post_event(Arc::new(notification)) {
                error!(error = %e, "Could not post NoSubscriberEvent");
            }
        }
    }

    fn post_to_subscription(
        &self,
        subscription: &Arc<Subscription>,
        event: &EventRef,
        is_main_thread: bool,
    ) -> EventBusResult<()> {
        let thread_mode = subscription.thread_mode();
        let deferred = match thread_mode {
            ThreadMode::Posting => None,
            ThreadMode::Main => match &self.main_poster {
                Some(poster) if !is_main_thread => {
                    Some(poster.enqueue(subscription.clone(), event.clone()))
                }
                _ => None,
            },
            ThreadMode::Background if is_main_thread => Some(
                self.background_poster
                    .enqueue(subscription.clone(), event.clone()),
            ),
            ThreadMode::Background => None,
            ThreadMode::Async => Some(
                self.async_poster
                    .enqueue(subscription.clone(), event.clone()),
            ),
        };

        match deferred {
            None => self.invoke_subscriber(subscription, event),
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => {
                error!(
                    event_type = %event.event_type(),
                    subscriber = ?subscription.subscriber(),
                    thread_mode = %thread_mode,
                    error = %e,
                    "Could not hand event to its thread, event dropped"
                );
                Ok(())
            }
        }
    }

    fn invoke_subscriber(&self, subscription: &Subscription, event: &EventRef) -> EventBusResult<()> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            subscription
                .binding()
                .invoke(subscription.subscriber(), event)
        }));
        let failure: HandlerError = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(panic) => panic_message(panic).into(),
        };
        self.handle_subscriber_exception(subscription, event, Arc::from(failure))
    }

    fn handle_subscriber_exception(
        &self,
        subscription: &Subscription,
        event: &EventRef,
        cause: Arc<dyn std::error::Error + Send + Sync>,
    ) -> EventBusResult<()> {
        if let Some(exception_event) = event.downcast_ref::<SubscriberExceptionEvent>() {
            if self.config.log_subscriber_exceptions {
                error!(
                    subscriber = ?subscription.subscriber(),
                    error = %cause,
                    "SubscriberExceptionEvent subscriber threw an exception"
                );
                error!(
                    event_type = %exception_event.causing_event.event_type(),
                    subscriber = ?exception_event.causing_subscriber,
                    error = %exception_event.cause,
                    "Initial event caused exception"
                );
            }
            return Ok(());
        }

        if self.config.log_subscriber_exceptions {
            error!(
                event_type = %event.event_type(),
                subscriber = ?subscription.subscriber(),
                handler = subscription.binding().name(),
                error = %cause,
                "Could not dispatch event to subscribing class"
            );
        }
        if self.config.send_subscriber_exception_event {
            let exception_event = SubscriberExceptionEvent {
                event_bus: self.weak_handle(),
                cause: cause.clone(),
                causing_event: event.clone(),
                causing_subscriber: subscription.subscriber().clone(),
            };
            if let Err(e) = self.post_event(Arc::new(exception_event)) {
                error!(error = %e, "Could not post SubscriberExceptionEvent");
            }
        }
        if self.config.throw_subscriber_exception {
            return Err(EventBusError::HandlerInvocationFailure {
                event_type: event.event_type().to_string(),
                subscriber: subscription.subscriber().type_name().to_string(),
                source: cause,
            });
        }
        Ok(())
    }

    fn deliver_sticky_events(&self, subscriptions: &[Arc<Subscription>]) -> EventBusResult<()> {
        let is_main_thread = self.is_main_thread();
        let mut first_failure = None;
        for subscription in subscriptions {
            let sticky_events = self
                .sticky
                .matching(&subscription.event_type(), self.config.event_inheritance);
            for event in sticky_events {
                if let Err(e) = self.post_to_subscription(subscription, &event, is_main_thread) {
                    first_failure.get_or_insert(e);
                }
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    fn cancel_event_delivery(&self, event: &dyn Event) -> EventBusResult<()> {
        let mut state = self.posting.current().borrow_mut();
        if !state.is_posting {
            return Err(EventBusError::illegal_cancellation(
                "This method may only be called from inside event handling methods on the posting thread",
            ));
        }
        let Some((current_event, subscription)) = state.current.as_ref() else {
            return Err(EventBusError::illegal_cancellation(
                "No event is being dispatched",
            ));
        };
        // Handlers typed on a supertype hold the view they were given
        let is_current = same_event(current_event.as_ref(), event)
            || current_event
                .view(subscription.event_type().id())
                .is_some_and(|view| {
                    std::ptr::eq(
                        view as *const dyn Any as *const (),
                        event as *const dyn Event as *const (),
                    )
                });
        if !is_current {
            return Err(EventBusError::illegal_cancellation(
                "Only the currently handled event may be aborted",
            ));
        }
        if subscription.thread_mode() != ThreadMode::Posting {
            return Err(EventBusError::illegal_cancellation(
                "Event handlers may only abort the incoming event",
            ));
        }
        state.canceled = true;
        Ok(())
    }
}

impl Delivery for BusCore {
    fn invoke_pending(&self, pending: Box<PendingPost>) {
        let Some((subscription, event)) = self.pool.release(pending) else {
            return;
        };
        if !subscription.is_active() {
            trace!(
                subscriber = ?subscription.subscriber(),
                "Dropping delivery to unregistered subscriber"
            );
            return;
        }
        if let Err(e) = self.invoke_subscriber(&subscription, &event) {
            error!(
                event_type = %event.event_type(),
                subscriber = ?subscription.subscriber(),
                error = %e,
                "Deferred handler failed"
            );
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}

/// Assembles an [`EventBus`] from a [`BusConfig`] and optional executors.
#[derive(Default)]
pub struct EventBusBuilder {
    config: BusConfig,
    main_thread: Option<Arc<dyn MainThreadSupport>>,
    worker_pool: Option<Arc<dyn WorkerPool>>,
}

impl EventBusBuilder {
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn throw_subscriber_exception(mut self, enabled: bool) -> Self {
        self.config.throw_subscriber_exception = enabled;
        self
    }

    pub fn log_subscriber_exceptions(mut self, enabled: bool) -> Self {
        self.config.log_subscriber_exceptions = enabled;
        self
    }

    pub fn log_no_subscriber_messages(mut self, enabled: bool) -> Self {
        self.config.log_no_subscriber_messages = enabled;
        self
    }

    pub fn send_subscriber_exception_event(mut self, enabled: bool) -> Self {
        self.config.send_subscriber_exception_event = enabled;
        self
    }

    pub fn send_no_subscriber_event(mut self, enabled: bool) -> Self {
        self.config.send_no_subscriber_event = enabled;
        self
    }

    /// With inheritance off, events only reach subscriptions of their exact type.
    pub fn event_inheritance(mut self, enabled: bool) -> Self {
        self.config.event_inheritance = enabled;
        self
    }

    /// Handler names of `S` are not verified; unknown suffixes are skipped.
    pub fn skip_method_verification_for<S: ?Sized + 'static>(mut self) -> Self {
        self.config
            .skip_method_verification_for
            .push(type_name::<S>().to_string());
        self
    }

    pub fn main_thread_budget(mut self, budget: Duration) -> Self {
        self.config.main_thread_budget = budget;
        self
    }

    pub fn main_thread(mut self, main_thread: Arc<dyn MainThreadSupport>) -> Self {
        self.main_thread = Some(main_thread);
        self
    }

    pub fn worker_pool(mut self, worker_pool: Arc<dyn WorkerPool>) -> Self {
        self.worker_pool = Some(worker_pool);
        self
    }

    pub fn build(self) -> EventBus {
        let Self {
            config,
            main_thread,
            worker_pool,
        } = self;
        let worker_pool = worker_pool
            .unwrap_or_else(|| Arc::new(LazyWorkerPool::new(config.worker_threads)));
        let pool = Arc::new(PendingPostPool::new(config.pending_post_pool_size));

        let core = Arc::new_cyclic(|core: &Weak<BusCore>| {
            let delivery: Weak<dyn Delivery> = core.clone();
            BusCore {
                id: BusId::next(),
                this: core.clone(),
                posting: PostingStates::new(),
                registry: SubscriptionRegistry::new(),
                sticky: StickyStore::new(),
                discovery: HandlerDiscovery::new(&config.skip_method_verification_for),
                main_poster: main_thread.as_ref().map(|main_thread| {
                    MainThreadPoster::new(
                        delivery.clone(),
                        main_thread.clone(),
                        pool.clone(),
                        config.main_thread_budget,
                    )
                }),
                background_poster: BackgroundPoster::new(
                    delivery.clone(),
                    worker_pool.clone(),
                    pool.clone(),
                ),
                async_poster: AsyncPoster::new(delivery, worker_pool, pool.clone()),
                pool,
                main_thread,
                config,
            }
        });
        debug!(bus = ?core.id, "Event bus created");
        EventBus { core }
    }

    /// Builds the bus and makes it the process-wide default. Fails if a
    /// default instance already exists.
    pub fn install_default(self) -> EventBusResult<EventBus> {
        let bus = self.build();
        DEFAULT_BUS
            .set(bus.clone())
            .map_err(|_| EventBusError::DefaultInstanceExists)?;
        Ok(bus)
    }
}
