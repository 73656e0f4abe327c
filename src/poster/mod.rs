//! # Deferred Delivery
//!
//! Posters move a (subscription, event) carrier off the posting thread:
//!
//! - [`MainThreadPoster`] onto the main thread, in time-sliced turns
//! - [`BackgroundPoster`] onto one pool worker at a time, in FIFO order
//! - [`AsyncPoster`] onto any pool worker, unordered
//!
//! A poster holds only a weak reference to the bus. Queued carriers of a bus
//! that has been dropped are discarded. When the target thread refuses work,
//! the poster drops every carrier it can no longer run, returns them to the
//! pool and reports the error.

pub mod async_poster;
pub mod background;
pub mod main_thread;
pub mod pending_post;

pub use async_poster::AsyncPoster;
pub use background::BackgroundPoster;
pub use main_thread::MainThreadPoster;
pub use pending_post::{PendingPost, PendingPostPool};

use std::collections::VecDeque;

use tracing::warn;

/// Receiver of carriers once they reached their target thread.
pub trait Delivery: Send + Sync + 'static {
    /// Releases the carrier and invokes its subscription, unless the
    /// subscription is no longer active.
    fn invoke_pending(&self, pending: Box<PendingPost>);
}

/// Returns carriers no thread will run back to the pool.
fn release_stranded(pool: &PendingPostPool, stranded: VecDeque<Box<PendingPost>>) {
    if stranded.is_empty() {
        return;
    }
    warn!(dropped = stranded.len(), "Dropping undeliverable events");
    for pending in stranded {
        pool.release(pending);
    }
}
