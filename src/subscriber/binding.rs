use std::{
    any::{type_name, Any, TypeId},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use super::{Subscriber, SubscriberHandle, ThreadMode};
use crate::{
    event::{Event, EventRef, EventType, Hierarchy},
    HandlerError, HandlerResult,
};

pub(crate) type Invoker =
    dyn Fn(&(dyn Any + Send + Sync), &EventRef) -> HandlerResult + Send + Sync;

/// The subscriber type a handler was declared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclaringType {
    pub id: TypeId,
    pub name: &'static str,
}

impl DeclaringType {
    pub fn of<S: 'static>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: type_name::<S>(),
        }
    }
}

/// A discovered handler: which event type it takes, which thread it runs on,
/// and how to call it. Shared by every instance of the subscriber type.
#[derive(Clone)]
pub struct HandlerBinding {
    name: String,
    declaring_type: DeclaringType,
    event_type: EventType,
    thread_mode: ThreadMode,
    invoker: Arc<Invoker>,
}

impl HandlerBinding {
    pub(crate) fn new(
        candidate: &HandlerCandidate,
        declaring_type: DeclaringType,
        thread_mode: ThreadMode,
    ) -> Self {
        Self {
            name: candidate.name.clone(),
            declaring_type,
            event_type: candidate.event_type,
            thread_mode,
            invoker: candidate.invoker.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_type(&self) -> DeclaringType {
        self.declaring_type
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn thread_mode(&self) -> ThreadMode {
        self.thread_mode
    }

    pub(crate) fn invoke(&self, subscriber: &SubscriberHandle, event: &EventRef) -> HandlerResult {
        (self.invoker)(subscriber.instance(), event)
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("name", &self.name)
            .field("declaring_type", &self.declaring_type.name)
            .field("event_type", &self.event_type)
            .field("thread_mode", &self.thread_mode)
            .finish()
    }
}

/// A handler as declared, before its name is validated.
#[derive(Clone)]
pub(crate) struct HandlerCandidate {
    pub name: String,
    pub event_type: EventType,
    pub invoker: Arc<Invoker>,
}

/// Handlers declared by one subscriber type, followed by the levels it inherits.
#[derive(Clone)]
pub(crate) struct DeclaredLevel {
    pub declaring_type: DeclaringType,
    pub candidates: Vec<HandlerCandidate>,
    pub parents: Vec<DeclaredLevel>,
}

impl DeclaredLevel {
    fn map_invokers(self, wrap: &dyn Fn(Arc<Invoker>) -> Arc<Invoker>) -> Self {
        Self {
            declaring_type: self.declaring_type,
            candidates: self
                .candidates
                .into_iter()
                .map(|candidate| HandlerCandidate {
                    invoker: wrap(candidate.invoker),
                    ..candidate
                })
                .collect(),
            parents: self
                .parents
                .into_iter()
                .map(|parent| parent.map_invokers(wrap))
                .collect(),
        }
    }
}

/// Collects the handlers of subscriber type `S`.
pub struct HandlerSet<S> {
    level: DeclaredLevel,
    _subscriber: PhantomData<fn(&S)>,
}

impl<S: Subscriber> HandlerSet<S> {
    pub(crate) fn collect() -> DeclaredLevel {
        let mut set = Self {
            level: DeclaredLevel {
                declaring_type: DeclaringType::of::<S>(),
                candidates: Vec::new(),
                parents: Vec::new(),
            },
            _subscriber: PhantomData,
        };
        S::declare_handlers(&mut set);
        set.level
    }

    /// Declares a typed handler under an explicit `onEvent[Suffix]` name.
    ///
    /// When a descendant of `E` is posted, the handler receives the view its
    /// [`Hierarchy::project`](crate::event::Hierarchy::project) yields; a
    /// descendant that cannot be viewed as `E` fails the invocation.
    pub fn handler<E, F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        E: Hierarchy + Send + Sync + fmt::Debug,
        F: Fn(&S, &E) -> HandlerResult + Send + Sync + 'static,
    {
        let target = TypeId::of::<E>();
        let invoker = move |subscriber: &(dyn Any + Send + Sync), event: &EventRef| -> HandlerResult {
            let subscriber = downcast_subscriber::<S>(subscriber)?;
            match event.view(target).and_then(|view| view.downcast_ref::<E>()) {
                Some(event) => handler(subscriber, event),
                None => Err(format!(
                    "event {} cannot be viewed as {}",
                    event.event_type(),
                    type_name::<E>()
                )
                .into()),
            }
        };
        self.push(name, EventType::of::<E>(), Arc::new(invoker))
    }

    /// Declares a typed handler with the conventional name for `mode`.
    pub fn on<E, F>(&mut self, mode: ThreadMode, handler: F) -> &mut Self
    where
        E: Hierarchy + Send + Sync + fmt::Debug,
        F: Fn(&S, &E) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler(&mode.handler_name(), handler)
    }

    /// Declares a handler for an arbitrary event type, typically a capability
    /// marker such as `dyn Trait`. The handler receives the posted event as is.
    pub fn handler_for<F>(&mut self, name: &str, event_type: EventType, handler: F) -> &mut Self
    where
        F: Fn(&S, &EventRef) -> HandlerResult + Send + Sync + 'static,
    {
        let invoker = move |subscriber: &(dyn Any + Send + Sync), event: &EventRef| -> HandlerResult {
            handler(downcast_subscriber::<S>(subscriber)?, event)
        };
        self.push(name, event_type, Arc::new(invoker))
    }

    pub fn on_type<F>(&mut self, mode: ThreadMode, event_type: EventType, handler: F) -> &mut Self
    where
        F: Fn(&S, &EventRef) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler_for(&mode.handler_name(), event_type, handler)
    }

    /// Inherits the handlers of `B`, reached through `project`. Handlers
    /// declared on `S` with the same name and event type shadow the inherited
    /// ones.
    pub fn inherit<B: Subscriber>(&mut self, project: fn(&S) -> &B) -> &mut Self {
        let wrap = move |inner: Arc<Invoker>| -> Arc<Invoker> {
            Arc::new(
                move |subscriber: &(dyn Any + Send + Sync), event: &EventRef| -> HandlerResult {
                    let base: &(dyn Any + Send + Sync) =
                        project(downcast_subscriber::<S>(subscriber)?);
                    inner(base, event)
                },
            )
        };
        let parent = HandlerSet::<B>::collect().map_invokers(&wrap);
        self.level.parents.push(parent);
        self
    }

    fn push(&mut self, name: &str, event_type: EventType, invoker: Arc<Invoker>) -> &mut Self {
        self.level.candidates.push(HandlerCandidate {
            name: name.to_string(),
            event_type,
            invoker,
        });
        self
    }
}

fn downcast_subscriber<S: 'static>(subscriber: &(dyn Any + Send + Sync)) -> Result<&S, HandlerError> {
    subscriber
        .downcast_ref::<S>()
        .ok_or_else(|| format!("subscriber is not a {}", type_name::<S>()).into())
}
