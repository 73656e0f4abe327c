use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{error, trace};

use super::{release_stranded, Delivery, PendingPost, PendingPostPool};
use crate::{
    event::EventRef, executor::MainThreadSupport, registry::Subscription, EventBusResult,
};

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Box<PendingPost>>,
    active: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    delivery: Weak<dyn Delivery>,
    main_thread: Arc<dyn MainThreadSupport>,
    pool: Arc<PendingPostPool>,
    budget: Duration,
}

/// Delivers carriers on the main thread.
///
/// One drain job is scheduled at a time. A drain that exceeds its time budget
/// schedules a fresh job for the remainder, so other main-thread work can run
/// in between.
pub struct MainThreadPoster {
    inner: Arc<Inner>,
}

impl MainThreadPoster {
    pub fn new(
        delivery: Weak<dyn Delivery>,
        main_thread: Arc<dyn MainThreadSupport>,
        pool: Arc<PendingPostPool>,
        budget: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                delivery,
                main_thread,
                pool,
                budget,
            }),
        }
    }

    pub fn enqueue(&self, subscription: Arc<Subscription>, event: EventRef) -> EventBusResult<()> {
        let pending = self.inner.pool.obtain(subscription, event);
        {
            let mut state = self.inner.state.lock();
            state.queue.push_back(pending);
            if state.active {
                return Ok(());
            }
            state.active = true;
        }
        schedule_drain(&self.inner)
    }
}

fn schedule_drain(inner: &Arc<Inner>) -> EventBusResult<()> {
    let job_inner = inner.clone();
    let scheduled = inner
        .main_thread
        .schedule(Box::new(move || drain(job_inner)));
    if scheduled.is_err() {
        let stranded = {
            let mut state = inner.state.lock();
            state.active = false;
            std::mem::take(&mut state.queue)
        };
        release_stranded(&inner.pool, stranded);
    }
    scheduled
}

fn drain(inner: Arc<Inner>) {
    let Some(delivery) = inner.delivery.upgrade() else {
        let mut state = inner.state.lock();
        state.queue.clear();
        state.active = false;
        return;
    };

    let started = Instant::now();
    loop {
        let next = {
            let mut state = inner.state.lock();
            match state.queue.pop_front() {
                Some(pending) => pending,
                None => {
                    state.active = false;
                    return;
                }
            }
        };
        delivery.invoke_pending(next);

        if started.elapsed() >= inner.budget {
            trace!(budget = ?inner.budget, "Main thread budget exhausted, rescheduling");
            if let Err(e) = schedule_drain(&inner) {
                error!(error = %e, "Could not reschedule main thread delivery");
            }
            return;
        }
    }
}
