//! Per-thread posting state.
//!
//! Each bus keeps one state per thread that posted to it. The state is created
//! on the first post from that thread and freed together with the bus.

use std::{
    cell::RefCell,
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use thread_local::ThreadLocal;

use crate::{event::EventRef, registry::Subscription};

/// Identifies one bus instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusId(u64);

impl BusId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Default)]
pub struct PostingThreadState {
    pub queue: VecDeque<EventRef>,
    pub is_posting: bool,
    pub is_main_thread: bool,
    /// Event and subscription of the invocation in progress.
    pub current: Option<(EventRef, Arc<Subscription>)>,
    pub canceled: bool,
}

pub type SharedPostingState = RefCell<PostingThreadState>;

/// Posting states of one bus, one per thread.
#[derive(Default)]
pub struct PostingStates {
    states: ThreadLocal<SharedPostingState>,
}

impl PostingStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posting state of the calling thread.
    pub fn current(&self) -> &SharedPostingState {
        self.states.get_or_default()
    }

    /// Number of threads that have posted to the owning bus.
    pub fn thread_count(&mut self) -> usize {
        self.states.iter_mut().count()
    }
}

/// Leaves the draining state when dropped, even if the drain unwinds.
pub struct DrainGuard<'a> {
    state: &'a SharedPostingState,
}

impl<'a> DrainGuard<'a> {
    pub fn enter(state: &'a SharedPostingState, is_main_thread: bool) -> Self {
        {
            let mut state = state.borrow_mut();
            state.is_posting = true;
            state.is_main_thread = is_main_thread;
        }
        Self { state }
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.is_posting = false;
        state.is_main_thread = false;
    }
}
