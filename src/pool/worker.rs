//! Worker Pool Implementation
//!
//! The pool spawns `max_workers` tasks at construction. Workers share a
//! single bounded receiver guarded by an async mutex: whichever worker is
//! parked on the lock picks up the next item, releases the lock and runs
//! the task, so items never wait behind a busy worker.
//!
//! Shutdown drops the pool's queue sender. Workers drain every item
//! already queued and exit when the channel closes, so every submission
//! that returned `Ok` is executed, including one racing shutdown.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Queue slots per worker.
const QUEUE_SLOTS_PER_WORKER: usize = 16;

/// A unit of work executed by a pool worker.
///
/// Implementations receive the trace identifier supplied at submission and
/// the identity of the executing worker.
#[async_trait]
pub trait Task: Send + 'static {
    async fn run(self: Box<Self>, trace_id: &str, worker_id: usize);
}

/// Sizing for a [`Pool`].
///
/// The pool spawns a fixed set of `max_workers` tasks; `min_workers` is
/// validated (`1 <= min <= max`) to keep the configuration surface honest
/// about the smallest footprint the caller will tolerate.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
}

/// Errors surfaced by pool construction and submission.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Worker counts must satisfy `1 <= min <= max`.
    #[error("invalid pool sizing: min {min}, max {max}")]
    InvalidSizing { min: usize, max: usize },

    /// The pool has been shut down and takes no further work.
    #[error("pool is shut down")]
    Closed,
}

/// Point-in-time snapshot of pool utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker tasks.
    pub workers: usize,
    /// Tasks currently executing.
    pub active: usize,
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// Tasks executed since construction.
    pub executed: u64,
}

struct Job {
    trace_id: String,
    task: Box<dyn Task>,
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    executed: AtomicU64,
}

/// A bounded set of worker tasks consuming submitted work items.
pub struct Pool {
    name: String,
    workers: usize,
    queue_slots: usize,
    // None once shut down; dropping the sender closes the queue.
    tx: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

impl Pool {
    /// Creates the pool and spawns its workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(trace_id: &str, name: impl Into<String>, config: PoolConfig) -> Result<Self, PoolError> {
        if config.min_workers == 0 || config.max_workers < config.min_workers {
            return Err(PoolError::InvalidSizing {
                min: config.min_workers,
                max: config.max_workers,
            });
        }

        let name = name.into();
        let workers = config.max_workers;
        let queue_slots = workers * QUEUE_SLOTS_PER_WORKER;
        let (tx, rx) = mpsc::channel(queue_slots);
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            handles.push(tokio::spawn(worker_loop(
                name.clone(),
                id,
                Arc::clone(&rx),
                Arc::clone(&counters),
            )));
        }

        debug!(trace_id = %trace_id, pool = %name, workers = workers, "Worker pool started");

        Ok(Self {
            name,
            workers,
            queue_slots,
            tx: std::sync::Mutex::new(Some(tx)),
            handles: std::sync::Mutex::new(handles),
            counters,
            closed: AtomicBool::new(false),
        })
    }

    /// Submits a work item for execution by some worker.
    ///
    /// Awaits queue space when the pool is saturated (blocking-submit
    /// backpressure). Fails once the pool has been shut down; an `Ok`
    /// return means the item will be executed, even if shutdown begins
    /// while the send is in flight.
    pub async fn submit(&self, trace_id: &str, task: Box<dyn Task>) -> Result<(), PoolError> {
        // Cloning keeps the channel open for exactly this send, so a
        // concurrent shutdown cannot strand an accepted item.
        let tx = match self.tx.lock().unwrap().as_ref() {
            Some(tx) => tx.clone(),
            None => return Err(PoolError::Closed),
        };

        tx.send(Job {
            trace_id: trace_id.to_string(),
            task,
        })
        .await
        .map_err(|_| PoolError::Closed)
    }

    /// Stops accepting work, drains the queue and waits for every worker
    /// to exit. Idempotent.
    pub async fn shutdown(&self, trace_id: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!(trace_id = %trace_id, pool = %self.name, "Worker pool shutting down");

        // Closing the channel ends the stream once the queue is empty, so
        // workers drain everything already accepted before exiting.
        self.tx.lock().unwrap().take();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap();
            guard.drain(..).collect()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(pool = %self.name, error = %e, "Worker task failed during shutdown");
            }
        }

        debug!(
            trace_id = %trace_id,
            pool = %self.name,
            executed = self.counters.executed.load(Ordering::Relaxed),
            "Worker pool shut down"
        );
    }

    /// Returns a point-in-time snapshot of utilization counters.
    pub fn stats(&self) -> PoolStats {
        let queued = match self.tx.lock().unwrap().as_ref() {
            Some(tx) => self.queue_slots - tx.capacity(),
            None => 0,
        };

        PoolStats {
            workers: self.workers,
            active: self.counters.active.load(Ordering::Relaxed),
            queued,
            executed: self.counters.executed.load(Ordering::Relaxed),
        }
    }

    /// The pool's name, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

async fn worker_loop(
    name: String,
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    counters: Arc<Counters>,
) {
    // recv yields queued items until every sender is gone, then None.
    while let Some(Job { trace_id, task }) = { rx.lock().await.recv().await } {
        counters.active.fetch_add(1, Ordering::Relaxed);
        trace!(pool = %name, worker = id, trace_id = %trace_id, "Running task");
        task.run(&trace_id, id).await;
        counters.active.fetch_sub(1, Ordering::Relaxed);
        counters.executed.fetch_add(1, Ordering::Relaxed);
    }

    trace!(pool = %name, worker = id, "Worker exited");
}
