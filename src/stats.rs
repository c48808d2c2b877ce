//! Read-only statistics snapshots for a [`JobPool`](crate::JobPool).

/// A point-in-time snapshot of a job pool's counters.
///
/// The fields are not required to be mutually consistent at the instant of
/// return: only `queued` is sampled under the internal lock, the rest are
/// independent atomic loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads owned by the pool.
    pub worker_count: usize,
    /// Tasks currently sitting in the queue.
    pub queued: usize,
    /// Tasks currently executing inside a worker.
    pub in_flight: usize,
    /// Total tasks ever accepted by `submit`/`submit_labeled`.
    pub submitted: u64,
    /// Total tasks whose callable has returned (normally or by panicking).
    pub completed: u64,
}
