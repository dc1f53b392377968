//! Request scheduler
//!
//! Each active database has one bounded FIFO queue; a shared worker pool
//! drains the queues round-robin so one hot database cannot starve the
//! rest. A full queue rejects the enqueue with `QueueFull` — the caller
//! gets backpressure instead of the pool buffering without bound.
//!
//! Worker sizing: an explicit `workers` setting wins; otherwise the
//! count is `max(2 * cpus, 2 * active_dbs)` clamped to `[4, max_workers]`,
//! recomputed (upward only) whenever a database is registered.
//!
//! Shutdown drains: no new enqueues are accepted, workers finish what is
//! queued within the drain timeout, and anything still queued after the
//! timeout is answered with `PoolStopped`.

use parking_lot::{Condvar, Mutex};
use quill_core::{DbId, Error, Request, Response, Result, SchedulerConfig};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Request processor supplied by the pool.
pub type Handler = Arc<dyn Fn(Request) -> Response + Send + Sync>;

/// One queued request plus the channel its response goes to.
pub struct QueuedRequest {
    /// The request to execute.
    pub request: Request,
    /// Caller's response channel.
    pub reply: Sender<Response>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Draining,
    Stopped,
}

struct State {
    run: RunState,
    queues: FxHashMap<DbId, VecDeque<QueuedRequest>>,
    /// Round-robin order over active databases.
    order: Vec<DbId>,
    cursor: usize,
}

struct Shared {
    state: Mutex<State>,
    work: Condvar,
    handler: Handler,
}

/// Bounded per-database queues drained by a shared worker pool.
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// New scheduler. Workers are spawned as databases are registered.
    pub fn new(config: SchedulerConfig, handler: Handler) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    run: RunState::Running,
                    queues: FxHashMap::default(),
                    order: Vec::new(),
                    cursor: 0,
                }),
                work: Condvar::new(),
                handler,
            }),
            workers: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Register a database's queue and grow the worker pool to its
    /// target size.
    pub fn register_db(&self, db: DbId) {
        self.add_queue(db);
        self.ensure_workers();
    }

    fn add_queue(&self, db: DbId) {
        let mut state = self.shared.state.lock();
        if state.run != RunState::Running {
            return;
        }
        state.queues.entry(db).or_default();
        if !state.order.contains(&db) {
            state.order.push(db);
        }
    }

    /// Remove a database's queue; pending requests are answered with
    /// `DbNotActive`.
    pub fn unregister_db(&self, db: DbId) {
        let drained = {
            let mut state = self.shared.state.lock();
            state.order.retain(|d| *d != db);
            if state.cursor >= state.order.len() {
                state.cursor = 0;
            }
            state.queues.remove(&db)
        };
        if let Some(queue) = drained {
            for job in queue {
                let _ = job.reply.send(Response::from_error(&Error::DbNotActive(db)));
            }
        }
    }

    /// Queue a request for its database.
    ///
    /// Fails with `PoolStopped` when the scheduler is draining or
    /// stopped, `DbNotActive` when the database has no queue, and
    /// `QueueFull` when the queue is at its depth limit.
    pub fn enqueue(&self, request: Request, reply: Sender<Response>) -> Result<()> {
        let db = request.db_id;
        {
            let mut state = self.shared.state.lock();
            if state.run != RunState::Running {
                return Err(Error::PoolStopped);
            }
            let queue = state.queues.get_mut(&db).ok_or(Error::DbNotActive(db))?;
            if queue.len() >= self.config.queue_depth {
                return Err(Error::QueueFull(db));
            }
            queue.push_back(QueuedRequest { request, reply });
        }
        self.shared.work.notify_one();
        Ok(())
    }

    /// Registered database count.
    pub fn active_dbs(&self) -> usize {
        self.shared.state.lock().order.len()
    }

    /// Requests queued across all databases.
    pub fn pending(&self) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .values()
            .map(|q| q.len())
            .sum()
    }

    /// Current worker thread count.
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    fn ensure_workers(&self) {
        if self.shared.state.lock().run != RunState::Running {
            return;
        }
        let target = worker_target(&self.config, self.active_dbs());
        let mut workers = self.workers.lock();
        while workers.len() < target {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name(format!("quill-worker-{}", workers.len()))
                .spawn(move || worker_loop(shared))
                .expect("failed to spawn scheduler worker");
            workers.push(handle);
        }
        debug!(workers = workers.len(), "scheduler worker pool sized");
    }

    /// Stop accepting work, drain queues within `drain_timeout`, answer
    /// anything stranded with `PoolStopped`, and join the workers.
    pub fn stop(&self, drain_timeout: Duration) {
        {
            let mut state = self.shared.state.lock();
            if state.run == RunState::Stopped {
                return;
            }
            state.run = RunState::Draining;
        }
        self.shared.work.notify_all();

        let deadline = Instant::now() + drain_timeout;
        {
            let mut state = self.shared.state.lock();
            while state.queues.values().any(|q| !q.is_empty()) {
                if Instant::now() >= deadline {
                    let stranded: usize = state.queues.values().map(|q| q.len()).sum();
                    warn!(stranded, "drain timeout reached with requests still queued");
                    break;
                }
                self.shared
                    .work
                    .wait_for(&mut state, Duration::from_millis(10));
            }
            state.run = RunState::Stopped;
            for queue in state.queues.values_mut() {
                for job in queue.drain(..) {
                    let _ = job.reply.send(Response::from_error(&Error::PoolStopped));
                }
            }
        }
        self.shared.work.notify_all();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

/// Worker count for the given configuration and active database count.
fn worker_target(config: &SchedulerConfig, active_dbs: usize) -> usize {
    if config.workers != 0 {
        return config.workers;
    }
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (2 * cpus)
        .max(2 * active_dbs)
        .clamp(4, config.max_workers.max(4))
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if state.run == RunState::Stopped {
                    return;
                }
                if let Some(job) = take_next(&mut state) {
                    break job;
                }
                if state.run == RunState::Draining {
                    // Queues drained; wake the stop() waiter and exit
                    shared.work.notify_all();
                    return;
                }
                shared.work.wait(&mut state);
            }
        };
        let response = (shared.handler)(job.request);
        // A caller that dropped its receiver just doesn't get the answer
        let _ = job.reply.send(response);
        shared.work.notify_all();
    }
}

/// Pop the next request, scanning databases round-robin from the cursor.
fn take_next(state: &mut State) -> Option<QueuedRequest> {
    let n = state.order.len();
    for i in 0..n {
        let idx = (state.cursor + i) % n;
        let db = state.order[idx];
        if let Some(queue) = state.queues.get_mut(&db) {
            if let Some(job) = queue.pop_front() {
                state.cursor = (idx + 1) % n;
                return Some(job);
            }
        }
    }
    None
}
