use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

use super::{release_stranded, Delivery, PendingPost, PendingPostPool};
use crate::{event::EventRef, executor::WorkerPool, registry::Subscription, EventBusResult};

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Box<PendingPost>>,
    worker_active: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    delivery: Weak<dyn Delivery>,
    workers: Arc<dyn WorkerPool>,
    pool: Arc<PendingPostPool>,
}

/// Delivers carriers in FIFO order on at most one pool worker at a time.
pub struct BackgroundPoster {
    inner: Arc<Inner>,
}

impl BackgroundPoster {
    pub fn new(
        delivery: Weak<dyn Delivery>,
        workers: Arc<dyn WorkerPool>,
        pool: Arc<PendingPostPool>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                delivery,
                workers,
                pool,
            }),
        }
    }

    pub fn enqueue(&self, subscription: Arc<Subscription>, event: EventRef) -> EventBusResult<()> {
        let pending = self.inner.pool.obtain(subscription, event);
        {
            let mut state = self.inner.state.lock();
            state.queue.push_back(pending);
            if state.worker_active {
                return Ok(());
            }
            state.worker_active = true;
        }

        let job_inner = self.inner.clone();
        let submitted = self.inner.workers.submit(Box::new(move || run(job_inner)));
        if submitted.is_err() {
            let stranded = {
                let mut state = self.inner.state.lock();
                state.worker_active = false;
                std::mem::take(&mut state.queue)
            };
            release_stranded(&self.inner.pool, stranded);
        }
        submitted
    }
}

fn run(inner: Arc<Inner>) {
    let delivery = inner.delivery.upgrade();
    loop {
        let next = {
            let mut state = inner.state.lock();
            match state.queue.pop_front() {
                Some(pending) => pending,
                None => {
                    state.worker_active = false;
                    return;
                }
            }
        };
        match &delivery {
            Some(delivery) => delivery.invoke_pending(next),
            None => drop(next),
        }
    }
}
