//! # Event Types
//!
//! Rust has no runtime class hierarchy, so every event type (and every
//! "capability" marker an event can be matched through) describes its place in
//! the hierarchy by implementing [`Hierarchy`]. [`EventType`] captures that
//! description together with the type's `TypeId`.
//!
//! ```rust
//! use postbus::event::{EventType, Hierarchy};
//!
//! trait Shape {}
//! impl Hierarchy for dyn Shape {}
//!
//! #[derive(Debug)]
//! struct Figure;
//! impl Hierarchy for Figure {}
//!
//! #[derive(Debug)]
//! struct Circle {
//!     figure: Figure,
//! }
//! impl Hierarchy for Circle {
//!     fn interfaces() -> Vec<EventType> {
//!         vec![EventType::of::<dyn Shape>()]
//!     }
//!     fn superclass() -> Option<EventType> {
//!         Some(EventType::of::<Figure>())
//!     }
//! }
//! ```

use std::{
    any::{type_name, Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Declares where a type sits in the event hierarchy.
///
/// Both methods default to "nothing", so a plain event only needs an empty
/// `impl Hierarchy for MyEvent {}`.
pub trait Hierarchy: 'static {
    /// Capability sets this type directly implements.
    fn interfaces() -> Vec<EventType> {
        Vec::new()
    }

    /// Direct parent type, if any.
    fn superclass() -> Option<EventType> {
        None
    }

    /// Views this instance as one of its ancestors, so handlers typed on the
    /// ancestor can read a posted descendant. Composition-based hierarchies
    /// return the embedded parent here.
    fn project(&self, _target: TypeId) -> Option<&dyn Any>
    where
        Self: Sized,
    {
        None
    }
}

/// Erased identifier of a runtime type.
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
    interfaces: fn() -> Vec<EventType>,
    superclass: fn() -> Option<EventType>,
}

impl EventType {
    pub fn of<T: Hierarchy + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            interfaces: T::interfaces,
            superclass: T::superclass,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn interfaces(&self) -> Vec<EventType> {
        (self.interfaces)()
    }

    pub fn superclass(&self) -> Option<EventType> {
        (self.superclass)()
    }

    /// True if an event of type `other` may be delivered to a subscription of
    /// this type.
    pub fn is_assignable_from(&self, other: &EventType) -> bool {
        self == other || super::resolver::lookup_all_event_types(other).contains(self)
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventType({})", self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// An object that can be posted to the bus.
///
/// Implemented automatically for every `Hierarchy + Send + Sync + Debug` type.
pub trait Event: Any + Send + Sync + fmt::Debug {
    fn event_type(&self) -> EventType;

    fn as_any(&self) -> &dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Views the event as `target`: itself for its own type, otherwise
    /// whatever its [`Hierarchy::project`] yields.
    fn view(&self, target: TypeId) -> Option<&dyn Any>;
}

impl<T> Event for T
where
    T: Hierarchy + Send + Sync + fmt::Debug,
{
    fn event_type(&self) -> EventType {
        EventType::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn view(&self, target: TypeId) -> Option<&dyn Any> {
        if target == TypeId::of::<T>() {
            Some(self)
        } else {
            self.project(target)
        }
    }
}

impl dyn Event {
    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Shared handle to a posted event. Identity is pointer identity.
pub type EventRef = Arc<dyn Event>;

/// True if both references point at the same event instance.
pub fn same_event(a: &dyn Event, b: &dyn Event) -> bool {
    std::ptr::eq(
        a as *const dyn Event as *const (),
        b as *const dyn Event as *const (),
    )
}
