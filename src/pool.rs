//! The job pool's concurrency engine: FIFO queue, worker loop, and the
//! submit/wait-idle/stop protocol.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

#[cfg(feature = "telemetry")]
use std::thread::ThreadId;

use parking_lot::{Condvar, Mutex};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::stats::PoolStats;

#[cfg(feature = "telemetry")]
use crate::diagnostics::{PoolDiagnostics, TaskInfo, WorkerDiagnostics};

/// An opaque, fire-and-forget unit of work.
pub type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

/// Shutdown mode for [`JobPool::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopMode {
    /// Execute every already-queued task before the pool stops.
    #[default]
    Drain,
    /// Discard queued tasks immediately; wait only for in-flight ones.
    CancelPending,
}

struct QueuedTask {
    task: BoxedTask,
    #[cfg(feature = "telemetry")]
    id: u64,
    #[cfg(feature = "telemetry")]
    label: Option<&'static str>,
}

/// State guarded by the single mutex: the queue itself, plus the stop
/// latch that workers re-check every time they wake.
struct QueueState {
    queue: VecDeque<QueuedTask>,
    stop_requested: bool,
}

#[cfg(feature = "telemetry")]
struct WorkerSlot {
    running: AtomicBool,
    running_task_id: AtomicU64,
    running_label: Mutex<Option<&'static str>>,
}

#[cfg(feature = "telemetry")]
impl WorkerSlot {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            running_task_id: AtomicU64::new(0),
            running_label: Mutex::new(None),
        }
    }
}

struct Shared {
    state: Mutex<QueueState>,
    /// Wakes workers when the queue gains work, or when stop is requested.
    work_cvar: Condvar,
    /// Wakes `wait_idle`/`stop` waiters when the queue drains or a task completes.
    idle_cvar: Condvar,
    /// One-way latch: once cleared, `submit` always fails.
    accepting: AtomicBool,
    submitted: AtomicU64,
    completed: AtomicU64,
    in_flight: AtomicUsize,
    #[cfg(feature = "telemetry")]
    next_task_id: AtomicU64,
    #[cfg(feature = "telemetry")]
    worker_slots: Vec<Arc<WorkerSlot>>,
}

/// A fixed-size pool of worker threads draining a shared FIFO task queue.
///
/// The pool is created with its workers already spawned and blocked on the
/// work condition. It accepts submissions until [`stop`](JobPool::stop) is
/// called (or the pool is dropped, which calls `stop(StopMode::Drain)`).
/// After `stop` returns, the pool is inert: submissions fail, statistics
/// remain readable, and the worker threads have been joined.
pub struct JobPool {
    shared: Arc<Shared>,
    /// Taken (emptied) by the first `stop` call; joined there.
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    #[cfg(feature = "telemetry")]
    worker_thread_ids: Vec<ThreadId>,
}

static_assertions::assert_impl_all!(JobPool: Send, Sync);

impl JobPool {
    /// Create a new job pool, spawning `config.worker_threads` (or an
    /// auto-sized count, falling back to one) worker threads immediately.
    ///
    /// Returns an error if any worker thread fails to spawn; workers that
    /// already started are stopped and joined before the error is returned,
    /// so a failed construction never leaves a half-alive pool behind.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let worker_count = config.resolve_worker_count();

        #[cfg(feature = "telemetry")]
        let worker_slots: Vec<Arc<WorkerSlot>> =
            (0..worker_count).map(|_| Arc::new(WorkerSlot::new())).collect();

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                stop_requested: false,
            }),
            work_cvar: Condvar::new(),
            idle_cvar: Condvar::new(),
            accepting: AtomicBool::new(true),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            #[cfg(feature = "telemetry")]
            next_task_id: AtomicU64::new(1),
            #[cfg(feature = "telemetry")]
            worker_slots,
        });

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker_shared = shared.clone();
            let mut builder =
                thread::Builder::new().name(format!("{}-{index}", config.thread_name));
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let spawn_result = builder.spawn(move || {
                worker_loop(worker_shared, index);
            });

            match spawn_result {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    tracing::error!(
                        worker_index = index,
                        error = %err,
                        "failed to spawn job pool worker"
                    );
                    teardown_partial(&shared, workers);
                    return Err(PoolError::SpawnFailed(err));
                }
            }
        }

        #[cfg(feature = "telemetry")]
        let worker_thread_ids: Vec<ThreadId> = workers.iter().map(|h| h.thread().id()).collect();

        tracing::debug!(worker_count, "job pool constructed");

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            worker_count,
            #[cfg(feature = "telemetry")]
            worker_thread_ids,
        })
    }

    /// Submit a task for background execution.
    ///
    /// Returns `true` iff the task was enqueued. Returns `false` if the pool
    /// is no longer accepting submissions (stopping or stopped); there is no
    /// other failure mode, the queue is unbounded.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_boxed(Some(Box::new(task)), None)
    }

    /// Like [`submit`](Self::submit), stamping a telemetry id and storing
    /// `label` when the `telemetry` feature is enabled. `label` is ignored
    /// otherwise.
    pub fn submit_labeled<F>(&self, label: &'static str, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_boxed(Some(Box::new(task)), Some(label))
    }

    /// Submit an already-boxed, possibly-empty task.
    ///
    /// Returns `false` without touching any state if `task` is `None`, the
    /// `EmptyCallable` failure kind. Most callers want [`submit`](Self::submit).
    pub fn submit_job(&self, task: Option<BoxedTask>) -> bool {
        self.submit_boxed(task, None)
    }

    /// Like [`submit_job`](Self::submit_job), with a telemetry label.
    pub fn submit_labeled_job(&self, label: &'static str, task: Option<BoxedTask>) -> bool {
        self.submit_boxed(task, Some(label))
    }

    fn submit_boxed(&self, task: Option<BoxedTask>, label: Option<&'static str>) -> bool {
        let Some(task) = task else {
            return false;
        };

        // Fast path: reject without locking once shutdown has begun.
        if !self.shared.accepting.load(Ordering::Acquire) {
            return false;
        }

        let mut state = self.shared.state.lock();
        // Re-check under the lock. Without this, a submission that raced past
        // the fast path could enqueue after `stop(CancelPending)` already
        // cleared the queue.
        if !self.shared.accepting.load(Ordering::Acquire) {
            return false;
        }

        #[cfg(feature = "telemetry")]
        let id = self.shared.next_task_id.fetch_add(1, Ordering::Relaxed);
        #[cfg(not(feature = "telemetry"))]
        let _ = label;

        state.queue.push_back(QueuedTask {
            task,
            #[cfg(feature = "telemetry")]
            id,
            #[cfg(feature = "telemetry")]
            label,
        });
        self.shared.submitted.fetch_add(1, Ordering::AcqRel);
        drop(state);

        self.shared.work_cvar.notify_one();
        true
    }

    /// Block until the queue is empty and no task is in-flight.
    ///
    /// Calling this from inside a running task is a programmer error and
    /// will deadlock.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while !(state.queue.is_empty() && self.shared.in_flight.load(Ordering::Acquire) == 0) {
            self.shared.idle_cvar.wait(&mut state);
        }
    }

    /// Stop accepting new submissions and shut the pool down.
    ///
    /// Idempotent: the first caller performs shutdown; subsequent calls
    /// (including the one made implicitly by `Drop`) return immediately.
    pub fn stop(&self, mode: StopMode) {
        if self
            .shared
            .accepting
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        tracing::debug!(?mode, "job pool stop requested");

        {
            let mut state = self.shared.state.lock();
            if mode == StopMode::CancelPending {
                let discarded = state.queue.len();
                state.queue.clear();
                if discarded > 0 {
                    tracing::debug!(discarded, "discarded queued tasks on cancel");
                }
            }
            state.stop_requested = true;
        }
        self.shared.work_cvar.notify_all();

        match mode {
            StopMode::Drain => self.wait_idle(),
            StopMode::CancelPending => {
                let mut state = self.shared.state.lock();
                while self.shared.in_flight.load(Ordering::Acquire) != 0 {
                    self.shared.idle_cvar.wait(&mut state);
                }
            }
        }

        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.join();
        }

        tracing::debug!("job pool stopped");
    }

    /// A point-in-time snapshot of the pool's counters.
    pub fn get_stats(&self) -> PoolStats {
        let queued = self.shared.state.lock().queue.len();
        PoolStats {
            worker_count: self.worker_count,
            queued,
            in_flight: self.shared.in_flight.load(Ordering::Acquire),
            submitted: self.shared.submitted.load(Ordering::Acquire),
            completed: self.shared.completed.load(Ordering::Acquire),
        }
    }

    /// A full diagnostics snapshot: stats, per-worker activity, and the
    /// current queue contents. Only available with the `telemetry` feature.
    #[cfg(feature = "telemetry")]
    pub fn get_diagnostics(&self) -> PoolDiagnostics {
        let (stats, queued) = {
            let state = self.shared.state.lock();
            let queued: Vec<TaskInfo> = state
                .queue
                .iter()
                .map(|t| TaskInfo {
                    id: t.id,
                    label: t.label,
                })
                .collect();
            let stats = PoolStats {
                worker_count: self.worker_count,
                queued: state.queue.len(),
                in_flight: self.shared.in_flight.load(Ordering::Acquire),
                submitted: self.shared.submitted.load(Ordering::Acquire),
                completed: self.shared.completed.load(Ordering::Acquire),
            };
            (stats, queued)
        };

        let workers = self
            .shared
            .worker_slots
            .iter()
            .zip(self.worker_thread_ids.iter())
            .enumerate()
            .map(|(index, (slot, &os_thread_id))| {
                let running_task_id = match slot.running_task_id.load(Ordering::Acquire) {
                    0 => None,
                    id => Some(id),
                };
                WorkerDiagnostics {
                    index,
                    os_thread_id,
                    running: slot.running.load(Ordering::Acquire),
                    running_task_id,
                    running_label: *slot.running_label.lock(),
                }
            })
            .collect();

        PoolDiagnostics {
            stats,
            workers,
            queued,
        }
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        self.stop(StopMode::Drain);
    }
}

fn teardown_partial(shared: &Arc<Shared>, workers: Vec<JoinHandle<()>>) {
    shared.accepting.store(false, Ordering::Release);
    {
        let mut state = shared.state.lock();
        state.stop_requested = true;
    }
    shared.work_cvar.notify_all();
    for handle in workers {
        let _ = handle.join();
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    let _span = tracing::debug_span!("worker", index).entered();

    #[cfg(feature = "telemetry")]
    let slot = shared.worker_slots[index].clone();
    #[cfg(not(feature = "telemetry"))]
    let _ = index;

    loop {
        let job;
        {
            let mut state = shared.state.lock();
            loop {
                if state.stop_requested && state.queue.is_empty() {
                    return;
                }
                if !state.queue.is_empty() {
                    break;
                }
                shared.work_cvar.wait(&mut state);
            }
            job = state.queue.pop_front().expect("queue checked non-empty above");
            shared.in_flight.fetch_add(1, Ordering::AcqRel);
        }

        #[cfg(feature = "telemetry")]
        {
            slot.running_task_id.store(job.id, Ordering::Release);
            *slot.running_label.lock() = job.label;
            slot.running.store(true, Ordering::Release);
        }

        if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job.task)) {
            tracing::warn!(panic = %panic_message(&payload), "job pool task panicked; discarding");
        }

        #[cfg(feature = "telemetry")]
        {
            slot.running.store(false, Ordering::Release);
            slot.running_task_id.store(0, Ordering::Release);
            *slot.running_label.lock() = None;
        }

        {
            let mut _state = shared.state.lock();
            shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            shared.completed.fetch_add(1, Ordering::AcqRel);
            // Broadcast unconditionally rather than only on the
            // empty-and-zero-in-flight transition; simple and safe.
            shared.idle_cvar.notify_all();
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    #[test]
    fn reject_empty_callable() {
        let pool = JobPool::new(PoolConfig::with_threads(1)).unwrap();
        assert!(!pool.submit_job(None));
        let stats = pool.get_stats();
        assert_eq!(stats.submitted, 0);
        assert_eq!(stats.completed, 0);
    }

    #[test]
    fn submit_after_stop_fails() {
        let pool = JobPool::new(PoolConfig::with_threads(1)).unwrap();
        pool.stop(StopMode::Drain);
        assert!(!pool.submit(|| {}));
    }

    #[test]
    fn stop_is_idempotent() {
        let pool = JobPool::new(PoolConfig::with_threads(2)).unwrap();
        pool.submit(|| {});
        pool.stop(StopMode::Drain);
        pool.stop(StopMode::Drain);
        pool.stop(StopMode::CancelPending);
    }

    #[test]
    fn auto_sized_pool_has_at_least_one_worker() {
        let pool = JobPool::new(PoolConfig::default()).unwrap();
        assert!(pool.get_stats().worker_count >= 1);
    }

    #[test]
    fn fixed_worker_count_is_honored() {
        let pool = JobPool::new(PoolConfig::with_threads(3)).unwrap();
        assert_eq!(pool.get_stats().worker_count, 3);
    }

    #[test]
    fn fifo_order_preserved_on_single_worker() {
        let pool = JobPool::new(PoolConfig::with_threads(1)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20 {
            let order = order.clone();
            pool.submit(move || order.lock().push(i));
        }
        pool.wait_idle();

        let order = order.lock();
        let expected: Vec<i32> = (0..20).collect();
        assert_eq!(*order, expected);
    }

    #[test]
    fn exceptions_are_contained_and_counted() {
        let pool = JobPool::new(PoolConfig::with_threads(2)).unwrap();
        for _ in 0..10 {
            pool.submit(|| panic!("boom"));
        }
        pool.wait_idle();
        assert_eq!(pool.get_stats().completed, 10);

        // Pool stays usable after contained panics.
        let counter = Arc::new(AtomicI32::new(0));
        let counter_clone = counter.clone();
        pool.submit(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_idle_observes_completion() {
        let pool = JobPool::new(PoolConfig::with_threads(4)).unwrap();
        let counter = Arc::new(AtomicI32::new(0));

        for _ in 0..100 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait_idle();

        assert_eq!(counter.load(Ordering::SeqCst), 100);
        let stats = pool.get_stats();
        assert_eq!(stats.submitted, 100);
        assert_eq!(stats.completed, 100);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn cancel_pending_discards_queue_but_finishes_in_flight() {
        let pool = JobPool::new(PoolConfig::with_threads(1)).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let started = Arc::new((Mutex::new(false), Condvar::new()));

        {
            let ran = ran.clone();
            let gate = gate.clone();
            let started = started.clone();
            pool.submit(move || {
                {
                    let mut s = started.0.lock();
                    *s = true;
                    started.1.notify_all();
                }
                let mut held = gate.0.lock();
                while !*held {
                    gate.1.wait(&mut held);
                }
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }

        for _ in 0..20 {
            let ran = ran.clone();
            pool.submit(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }

        // Wait until the gated task is observed running.
        {
            let mut s = started.0.lock();
            while !*s {
                started.1.wait(&mut s);
            }
        }

        let pool = Arc::new(pool);
        let stopper = {
            let pool = pool.clone();
            thread::spawn(move || pool.stop(StopMode::CancelPending))
        };

        // Give `stop` a moment to clear the queue before releasing the gate.
        thread::sleep(Duration::from_millis(20));
        {
            let mut held = gate.0.lock();
            *held = true;
            gate.1.notify_all();
        }

        stopper.join().unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!pool.submit(|| {}));
    }
}
