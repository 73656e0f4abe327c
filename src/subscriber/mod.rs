//! # Subscribers
//!
//! A subscriber is any `Send + Sync` type registered through an `Arc`. It
//! declares its handlers once per type in [`Subscriber::declare_handlers`];
//! the bus discovers and caches them on first registration.
//!
//! Handler names follow the `onEvent[Suffix]` convention. The suffix picks
//! the thread the handler runs on:
//!
//! | Name                       | [`ThreadMode`]  | Runs on                          |
//! |----------------------------|-----------------|----------------------------------|
//! | `onEvent`                  | `Posting`       | the posting thread, inline       |
//! | `onEventMainThread`        | `Main`          | the main (affinity) thread       |
//! | `onEventBackgroundThread`  | `Background`    | one background worker at a time  |
//! | `onEventAsync`             | `Async`         | any worker, concurrently         |
//!
//! ```rust
//! use std::sync::Arc;
//! use postbus::{EventBus, Hierarchy, HandlerSet, Subscriber, ThreadMode};
//!
//! #[derive(Debug)]
//! struct OrderPlaced {
//!     id: u64,
//! }
//! impl Hierarchy for OrderPlaced {}
//!
//! struct Audit;
//!
//! impl Subscriber for Audit {
//!     fn declare_handlers(handlers: &mut HandlerSet<Self>) {
//!         handlers.on(ThreadMode::Posting, |_audit: &Audit, order: &OrderPlaced| {
//!             println!("order {} placed", order.id);
//!             Ok(())
//!         });
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = EventBus::new();
//! bus.register(&Arc::new(Audit))?;
//! bus.post(OrderPlaced { id: 7 })?;
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod discovery;

pub use binding::{DeclaringType, HandlerBinding, HandlerSet};
pub use discovery::HandlerDiscovery;

use std::{
    any::{type_name, Any},
    fmt,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Prefix every handler name starts with.
pub const HANDLER_NAME_PREFIX: &str = "onEvent";

/// Types that receive events from the bus.
pub trait Subscriber: Send + Sync + 'static {
    fn declare_handlers(handlers: &mut HandlerSet<Self>)
    where
        Self: Sized;
}

/// Execution context a handler is invoked in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, Serialize, Deserialize,
)]
pub enum ThreadMode {
    /// Inline on the posting thread.
    #[default]
    Posting,
    /// On the main thread; inline when posted from it.
    Main,
    /// Serialized on a single background worker; inline when posted off the main thread.
    Background,
    /// On any pool worker, with no ordering between events.
    Async,
}

impl ThreadMode {
    pub fn suffix(self) -> &'static str {
        match self {
            ThreadMode::Posting => "",
            ThreadMode::Main => "MainThread",
            ThreadMode::Background => "BackgroundThread",
            ThreadMode::Async => "Async",
        }
    }

    /// Conventional handler name for this mode, e.g. `onEventMainThread`.
    pub fn handler_name(self) -> String {
        format!("{}{}", HANDLER_NAME_PREFIX, self.suffix())
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "" => Some(ThreadMode::Posting),
            "MainThread" => Some(ThreadMode::Main),
            "BackgroundThread" => Some(ThreadMode::Background),
            "Async" => Some(ThreadMode::Async),
            _ => None,
        }
    }
}

/// Reference identity of a registered subscriber instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

impl SubscriberId {
    pub fn of<S: ?Sized>(subscriber: &Arc<S>) -> Self {
        Self(Arc::as_ptr(subscriber) as *const () as usize)
    }
}

/// Type-erased, identity-compared handle to a subscriber instance.
#[derive(Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    type_name: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
}

impl SubscriberHandle {
    pub fn new<S: Send + Sync + 'static>(subscriber: &Arc<S>) -> Self {
        Self {
            id: SubscriberId::of(subscriber),
            type_name: type_name::<S>(),
            instance: subscriber.clone(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn instance(&self) -> &(dyn Any + Send + Sync) {
        self.instance.as_ref()
    }

    pub fn downcast<S: Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        self.instance.clone().downcast::<S>().ok()
    }
}

impl PartialEq for SubscriberHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubscriberHandle {}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.type_name, self.id.0)
    }
}
