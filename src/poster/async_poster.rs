use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{release_stranded, Delivery, PendingPostPool};
use crate::{event::EventRef, executor::WorkerPool, registry::Subscription, EventBusResult};

/// Hands every carrier to the worker pool as its own job.
pub struct AsyncPoster {
    delivery: Weak<dyn Delivery>,
    workers: Arc<dyn WorkerPool>,
    pool: Arc<PendingPostPool>,
}

impl AsyncPoster {
    pub fn new(
        delivery: Weak<dyn Delivery>,
        workers: Arc<dyn WorkerPool>,
        pool: Arc<PendingPostPool>,
    ) -> Self {
        Self {
            delivery,
            workers,
            pool,
        }
    }

    pub fn enqueue(&self, subscription: Arc<Subscription>, event: EventRef) -> EventBusResult<()> {
        let slot = Arc::new(Mutex::new(Some(self.pool.obtain(subscription, event))));
        let job_slot = slot.clone();
        let delivery = self.delivery.clone();
        let submitted = self.workers.submit(Box::new(move || {
            let pending = job_slot.lock().take();
            if let (Some(pending), Some(delivery)) = (pending, delivery.upgrade()) {
                delivery.invoke_pending(pending);
            }
        }));
        if submitted.is_err() {
            // A refused job never ran, so the carrier is still in the slot
            let stranded = slot.lock().take();
            release_stranded(&self.pool, stranded.into_iter().collect());
        }
        submitted
    }
}
