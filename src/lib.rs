//! A fixed-size pool of worker threads draining a shared FIFO task queue.
//!
//! This crate gives a host application (a game engine, a simulation, any
//! long-running process) a simple, low-overhead way to offload independent,
//! fire-and-forget units of work to background threads, observe their
//! progress, and shut the pool down deterministically.
//!
//! It deliberately does not provide task priorities, per-task dependencies,
//! work stealing, per-worker local queues, result values/futures, or
//! per-task cancellation. Submitted work is opaque and void-returning; a
//! worker that panics while running one is contained and the pool keeps
//! going.
//!
//! # Example
//!
//! ```
//! use lattice_jobpool::{JobPool, PoolConfig};
//!
//! let pool = JobPool::new(PoolConfig::with_threads(4)).unwrap();
//!
//! for _ in 0..100 {
//!     pool.submit(|| {
//!         // background work
//!     });
//! }
//!
//! pool.wait_idle();
//! assert_eq!(pool.get_stats().completed, 100);
//! ```
//!
//! # Shutdown
//!
//! ```
//! use lattice_jobpool::{JobPool, PoolConfig, StopMode};
//!
//! let pool = JobPool::new(PoolConfig::default()).unwrap();
//! pool.submit(|| { /* ... */ });
//! pool.stop(StopMode::Drain); // or StopMode::CancelPending
//! assert!(!pool.submit(|| {}));
//! ```

#![warn(missing_docs)]

mod config;
#[cfg(feature = "telemetry")]
pub mod diagnostics;
mod error;
mod pool;
pub mod stats;

pub use config::PoolConfig;
#[cfg(feature = "telemetry")]
pub use diagnostics::{PoolDiagnostics, TaskInfo, WorkerDiagnostics};
pub use error::{PoolError, Result};
pub use pool::{BoxedTask, JobPool, StopMode};
pub use stats::PoolStats;
