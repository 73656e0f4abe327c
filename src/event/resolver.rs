use std::{any::TypeId, collections::VecDeque, sync::Arc, sync::OnceLock};

use dashmap::DashMap;
use tracing::trace;

use super::EventType;

fn event_types_cache() -> &'static DashMap<TypeId, Arc<[EventType]>> {
    static CACHE: OnceLock<DashMap<TypeId, Arc<[EventType]>>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

/// Looks up every type an event of `event_type` can be delivered as: the type
/// itself, its capability sets (breadth-first, transitively), then each
/// ancestor followed by that ancestor's capability sets.
///
/// Results are cached for the lifetime of the process.
pub fn lookup_all_event_types(event_type: &EventType) -> Arc<[EventType]> {
    if let Some(cached) = event_types_cache().get(&event_type.id()) {
        return cached.clone();
    }

    let resolved: Arc<[EventType]> = resolve(event_type).into();
    trace!(event_type = %event_type, count = resolved.len(), "Resolved event types");
    event_types_cache()
        .entry(event_type.id())
        .or_insert(resolved)
        .clone()
}

/// Drops every cached resolution.
pub fn clear_caches() {
    event_types_cache().clear();
}

fn resolve(event_type: &EventType) -> Vec<EventType> {
    let mut event_types = Vec::new();
    let mut current = Some(*event_type);
    while let Some(class) = current {
        if !event_types.contains(&class) {
            event_types.push(class);
        }
        add_interfaces(&mut event_types, class.interfaces());
        current = class.superclass();
    }
    event_types
}

fn add_interfaces(event_types: &mut Vec<EventType>, interfaces: Vec<EventType>) {
    let mut pending: VecDeque<EventType> = interfaces.into();
    while let Some(interface) = pending.pop_front() {
        if !event_types.contains(&interface) {
            event_types.push(interface);
            pending.extend(interface.interfaces());
        }
    }
}
