use std::sync::Arc;

use parking_lot::Mutex;

use crate::{event::EventRef, registry::Subscription};

/// Carrier of one deferred delivery.
#[derive(Default)]
pub struct PendingPost {
    subscription: Option<Arc<Subscription>>,
    event: Option<EventRef>,
}

impl PendingPost {
    pub fn subscription(&self) -> Option<&Arc<Subscription>> {
        self.subscription.as_ref()
    }

    pub fn event(&self) -> Option<&EventRef> {
        self.event.as_ref()
    }
}

/// Free list of carriers, bounded by `capacity`.
pub struct PendingPostPool {
    free: Mutex<Vec<Box<PendingPost>>>,
    capacity: usize,
}

impl PendingPostPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn obtain(&self, subscription: Arc<Subscription>, event: EventRef) -> Box<PendingPost> {
        let recycled = self.free.lock().pop();
        let mut pending = recycled.unwrap_or_default();
        pending.subscription = Some(subscription);
        pending.event = Some(event);
        pending
    }

    /// Empties the carrier, returns it to the free list if there is room, and
    /// hands back what it carried.
    pub fn release(&self, mut pending: Box<PendingPost>) -> Option<(Arc<Subscription>, EventRef)> {
        let carried = pending.subscription.take().zip(pending.event.take());
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(pending);
        }
        carried
    }

    /// Number of carriers ready for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}
