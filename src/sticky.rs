use std::collections::HashMap;

use parking_lot::Mutex;

use crate::event::{lookup_all_event_types, same_event, Event, EventRef, EventType};

/// Most recent sticky event per exact event type.
#[derive(Default)]
pub struct StickyStore {
    events: Mutex<HashMap<EventType, EventRef>>,
}

impl StickyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `event` under its exact type, replacing the previous one.
    pub fn put(&self, event: EventRef) {
        let event_type = event.event_type();
        self.events.lock().insert(event_type, event);
    }

    pub fn get(&self, event_type: &EventType) -> Option<EventRef> {
        self.events.lock().get(event_type).cloned()
    }

    pub fn remove_type(&self, event_type: &EventType) -> Option<EventRef> {
        self.events.lock().remove(event_type)
    }

    /// Removes the entry for the event's type only if it holds this instance.
    pub fn remove_if_same(&self, event: &dyn Event) -> bool {
        let event_type = event.event_type();
        let mut events = self.events.lock();
        match events.get(&event_type) {
            Some(stored) if same_event(stored.as_ref(), event) => {
                events.remove(&event_type);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Sticky events deliverable to a subscription of `event_type`.
    ///
    /// With inheritance every stored event whose type is assignable to
    /// `event_type` matches, more specific types first. Otherwise only the
    /// exact type does.
    pub fn matching(&self, event_type: &EventType, inheritance: bool) -> Vec<EventRef> {
        if !inheritance {
            return self.get(event_type).into_iter().collect();
        }

        let candidates: Vec<(EventType, EventRef)> = self
            .events
            .lock()
            .iter()
            .map(|(stored_type, event)| (*stored_type, event.clone()))
            .collect();

        let mut matched: Vec<(usize, EventRef)> = candidates
            .into_iter()
            .filter_map(|(stored_type, event)| {
                let resolved = lookup_all_event_types(&stored_type);
                resolved
                    .contains(event_type)
                    .then(|| (resolved.len(), event))
            })
            .collect();
        matched.sort_by(|a, b| b.0.cmp(&a.0));
        matched.into_iter().map(|(_, event)| event).collect()
    }
}
