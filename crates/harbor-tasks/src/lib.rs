//! # Harbor Tasks
//!
//! Thread-based job execution for the Harbor runtime.
//!
//! This crate provides:
//!
//! 1. **Worker Pool**: a fixed set of named OS threads fed from one FIFO queue
//! 2. **Tasks**: caller-visible handles with a one-way state machine and a
//!    completion signal
//! 3. **Cancellation**: cooperative tokens with parent/child propagation
//!
//! ## Worker Pool
//!
//! ```rust
//! use harbor_tasks::{CancellationToken, PoolConfig, TaskState, WorkerPool};
//! use std::time::Duration;
//!
//! let pool = WorkerPool::with_config(
//!     PoolConfig::new()
//!         .with_size(4)
//!         .with_shutdown_timeout(Duration::from_secs(2)),
//! )
//! .unwrap();
//! pool.start().unwrap();
//!
//! // Submission never blocks on execution.
//! let token = CancellationToken::new();
//! let task = pool.submit(|| Ok::<_, std::io::Error>(()), token.clone());
//!
//! assert_eq!(task.wait(), TaskState::Finished);
//!
//! // Bounded: busy workers are detached after the timeout.
//! let report = pool.stop_default();
//! assert_eq!(report.joined, 4);
//! ```
//!
//! ## Task States
//!
//! ```text
//! Initial ──► Running ──► Finished
//!    │           └──────► Failed
//!    └──► Cancelled
//! ```
//!
//! Cancellation is checked once, when a worker picks the task up. A task
//! that has started always runs to `Finished` or `Failed`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod pool;
mod queue;
mod signal;
mod task;

pub use error::{BoxError, TaskError, TaskResult};
pub use pool::{
    PoolConfig, ShutdownReport, WorkerPool, DEFAULT_POOL_SIZE, DEFAULT_SHUTDOWN_TIMEOUT,
    MAX_POOL_SIZE,
};
pub use queue::JobQueue;
pub use signal::{CancellationToken, Signal};
pub use task::{Task, TaskId, TaskState, TaskStats};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{BoxError, TaskError, TaskResult};
    pub use crate::pool::{PoolConfig, ShutdownReport, WorkerPool};
    pub use crate::signal::{CancellationToken, Signal};
    pub use crate::task::{Task, TaskId, TaskState, TaskStats};
}
