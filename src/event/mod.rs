//! # Events
//!
//! Events are plain Rust values posted to the [`EventBus`](crate::EventBus) and
//! dispatched by their runtime type.
//!
//! ## Type Matching
//!
//! ```text
//! ┌─────────────┐   lookup_all_event_types   ┌──────────────────────────┐
//! │ posted type │──────────────────────────▶│ type, interfaces, parent, │
//! └─────────────┘                            │ parent's interfaces, ...  │
//!                                            └────────────┬─────────────┘
//!                                                         │ one snapshot per type
//!                                                   ┌─────▼──────┐
//!                                                   │Subscriptions│
//!                                                   └────────────┘
//! ```
//!
//! With `event_inheritance` disabled only the exact posted type is matched.
//!
//! ## Notification Events
//!
//! The bus itself posts two kinds of events:
//!
//! - [`SubscriberExceptionEvent`] when a handler fails
//! - [`NoSubscriberEvent`] when an event reached nobody
//!
//! Neither ever triggers another notification event.

pub mod event_type;
pub mod notifications;
pub mod resolver;

pub use event_type::*;
pub use notifications::*;
pub use resolver::{clear_caches, lookup_all_event_types};
