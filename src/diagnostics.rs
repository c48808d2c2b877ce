//! Telemetry-only diagnostics: per-worker and per-queued-task snapshots.
//!
//! Everything here is compiled only when the `telemetry` feature is enabled.
//! It adds no new concurrency contracts over [`PoolStats`](crate::PoolStats);
//! it is a read-only projection of state the core already tracks.

use std::thread::ThreadId;

use crate::stats::PoolStats;

/// Identity and label of a task, used by telemetry to describe what a
/// worker is running or what sits in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    /// Monotonically assigned task id (starts at 1, never repeats within a pool).
    pub id: u64,
    /// Optional static label supplied via `submit_labeled`.
    pub label: Option<&'static str>,
}

/// A snapshot of one worker's current activity.
///
/// Worker snapshots are read-only atomic loads; they may observe a task
/// start without observing the matching stop (the worker may finish and
/// pick up new work between the two loads that build this snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerDiagnostics {
    /// Index of the worker within the pool's worker set (`0..worker_count`).
    pub index: usize,
    /// Platform thread id of the worker.
    pub os_thread_id: ThreadId,
    /// Whether the worker is currently executing a task.
    pub running: bool,
    /// Id of the task currently executing, if any.
    pub running_task_id: Option<u64>,
    /// Label of the task currently executing, if any.
    pub running_label: Option<&'static str>,
}

/// A full diagnostics snapshot: stats, per-worker activity, and the queue contents.
#[derive(Debug, Clone)]
pub struct PoolDiagnostics {
    /// The same snapshot returned by `get_stats`.
    pub stats: PoolStats,
    /// One entry per worker thread.
    pub workers: Vec<WorkerDiagnostics>,
    /// Ids/labels of tasks currently queued, in FIFO order.
    pub queued: Vec<TaskInfo>,
}
