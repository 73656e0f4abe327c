//! # postbus
//!
//! An in-process publish/subscribe event bus. Producers post plain Rust values;
//! subscribers declare typed handlers and receive every posted event whose type
//! matches, on the thread their handler asks for.
//!
//! ```rust
//! use std::sync::Arc;
//! use postbus::{EventBus, HandlerSet, Hierarchy, Subscriber, ThreadMode};
//!
//! #[derive(Debug)]
//! struct Greeting(&'static str);
//! impl Hierarchy for Greeting {}
//!
//! struct Printer;
//! impl Subscriber for Printer {
//!     fn declare_handlers(handlers: &mut HandlerSet<Self>) {
//!         handlers.on(ThreadMode::Posting, |_: &Printer, greeting: &Greeting| {
//!             println!("{}", greeting.0);
//!             Ok(())
//!         });
//!     }
//! }
//!
//! # fn main() -> Result<(), postbus::EventBusError> {
//! let bus = EventBus::new();
//! let printer = Arc::new(Printer);
//! bus.register(&printer)?;
//! bus.post(Greeting("hello"))?;
//! assert!(bus.unregister(&printer));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`event`]: event types, hierarchy resolution and notification events
//! - [`subscriber`]: handler declaration and discovery
//! - [`registry`]: subscriptions per event type
//! - [`sticky`]: retained sticky events
//! - [`posting`]: per-thread posting queues
//! - [`poster`]: deferred delivery to other threads
//! - [`executor`]: main thread and worker pool executors
//! - [`event_bus`]: the bus and its builder

pub mod config;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod executor;
pub mod poster;
pub mod posting;
pub mod registry;
pub mod sticky;
pub mod subscriber;

// Re-exports
pub use config::BusConfig;
pub use error::*;
pub use event::{
    Event, EventRef, EventType, Hierarchy, NoSubscriberEvent, SubscriberExceptionEvent,
};
pub use event_bus::{EventBus, EventBusBuilder, WeakEventBus};
pub use executor::{
    Job, LazyWorkerPool, LooperThread, MainThreadSupport, TokioWorkerPool, WorkerPool,
};
pub use subscriber::{HandlerSet, Subscriber, SubscriberHandle, ThreadMode};

#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}
