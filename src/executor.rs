//! # Execution Substrates
//!
//! The bus never creates threads for deferred delivery on its own; it hands
//! jobs to two collaborators:
//!
//! - [`MainThreadSupport`]: the designated affinity thread, running jobs in
//!   submission order
//! - [`WorkerPool`]: a generic pool for background and async delivery
//!
//! [`LooperThread`] and [`TokioWorkerPool`] are the default implementations.
//! A bus built without an explicit pool uses a [`LazyWorkerPool`], which only
//! starts its runtime once the first deferred job arrives.

use std::{
    sync::OnceLock,
    thread::{self, JoinHandle, ThreadId},
};

use parking_lot::Mutex;
use tokio::{
    runtime::{Handle, Runtime},
    sync::mpsc,
};
use tracing::{debug, error};

use crate::{EventBusError, EventBusResult};

/// Unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[cfg_attr(test, mockall::automock)]
pub trait MainThreadSupport: Send + Sync {
    fn is_main_thread(&self) -> bool;

    /// Queues `job` on the main thread. Jobs run in submission order.
    fn schedule(&self, job: Job) -> EventBusResult<()>;
}

#[cfg_attr(test, mockall::automock)]
pub trait WorkerPool: Send + Sync {
    fn submit(&self, job: Job) -> EventBusResult<()>;
}

/// A dedicated OS thread running scheduled jobs one after another.
pub struct LooperThread {
    thread_id: ThreadId,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LooperThread {
    pub fn spawn(name: &str) -> EventBusResult<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    job();
                }
                debug!("Looper thread finished");
            })
            .map_err(|e| {
                EventBusError::ScheduleFailed(format!("Failed to spawn looper thread: {}", e))
            })?;

        Ok(Self {
            thread_id: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Stops accepting jobs, lets queued ones finish and joins the thread.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if thread::current().id() == self.thread_id {
                return;
            }
            if handle.join().is_err() {
                error!("Looper thread panicked");
            }
        }
    }
}

impl MainThreadSupport for LooperThread {
    fn is_main_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn schedule(&self, job: Job) -> EventBusResult<()> {
        let sender = self.sender.lock();
        let sender = sender
            .as_ref()
            .ok_or_else(|| EventBusError::ScheduleFailed("looper thread is shut down".into()))?;
        sender
            .send(job)
            .map_err(|_| EventBusError::ScheduleFailed("looper thread has exited".into()))
    }
}

impl Drop for LooperThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker pool backed by tokio's blocking thread pool.
pub struct TokioWorkerPool {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl TokioWorkerPool {
    /// Creates a pool with its own multi-threaded runtime.
    pub fn new(worker_threads: Option<usize>) -> EventBusResult<Self> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.thread_name("postbus-worker").enable_all();
        if let Some(worker_threads) = worker_threads {
            builder.worker_threads(worker_threads.max(1));
        }
        let runtime = builder.build().map_err(|e| {
            EventBusError::ScheduleFailed(format!("Failed to build worker runtime: {}", e))
        })?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Runs jobs on an existing runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: None,
        }
    }
}

impl WorkerPool for TokioWorkerPool {
    fn submit(&self, job: Job) -> EventBusResult<()> {
        self.handle.spawn_blocking(job);
        Ok(())
    }
}

impl Drop for TokioWorkerPool {
    fn drop(&mut self) {
        // Dropping a runtime inside async context panics
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Builds a [`TokioWorkerPool`] on first use.
pub struct LazyWorkerPool {
    worker_threads: Option<usize>,
    pool: OnceLock<TokioWorkerPool>,
}

impl LazyWorkerPool {
    pub fn new(worker_threads: Option<usize>) -> Self {
        Self {
            worker_threads,
            pool: OnceLock::new(),
        }
    }

    fn pool(&self) -> EventBusResult<&TokioWorkerPool> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }
        let created = TokioWorkerPool::new(self.worker_threads)?;
        debug!(worker_threads = ?self.worker_threads, "Started worker pool");
        // A concurrent caller may have won; the loser's runtime is shut down on drop
        let _ = self.pool.set(created);
        self.pool
            .get()
            .ok_or_else(|| EventBusError::internal("worker pool vanished after initialization"))
    }
}

impl WorkerPool for LazyWorkerPool {
    fn submit(&self, job: Job) -> EventBusResult<()> {
        self.pool()?.submit(job)
    }
}
