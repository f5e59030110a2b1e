//! Fixed-size worker pool.
//!
//! The pool owns `size` named OS threads. Each worker blocks until a job is
//! available or the pool is shut down, dequeues one job, and runs it to a
//! terminal state. Shutdown is bounded: workers that do not exit before the
//! deadline are detached and reported, never waited on indefinitely.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::error::{BoxError, TaskError, TaskResult};
use crate::queue::JobQueue;
use crate::signal::{CancellationToken, Signal};
use crate::task::{Job, Task, TaskStats};

/// Default number of worker threads.
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Largest accepted pool size.
pub const MAX_POOL_SIZE: usize = 32;

/// Default bound on how long [`WorkerPool::stop`] waits for workers.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(3000);

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub size: usize,
    /// How long `stop` waits for workers before detaching them.
    pub shutdown_timeout: Duration,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            thread_name_prefix: "harbor-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with a size given as a signed integer.
    ///
    /// Negative sizes and sizes above [`MAX_POOL_SIZE`] are rejected.
    pub fn sized(size: i64) -> TaskResult<Self> {
        if size < 0 {
            return Err(TaskError::invalid_config(format!(
                "pool size must not be negative, got {size}"
            )));
        }
        let size = usize::try_from(size)
            .map_err(|_| TaskError::invalid_config(format!("pool size {size} out of range")))?;
        let config = Self::new().with_size(size);
        config.validate()?;
        Ok(config)
    }

    /// Set the number of worker threads.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the worker thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Checks the size against [`MAX_POOL_SIZE`].
    pub fn validate(&self) -> TaskResult<()> {
        if self.size > MAX_POOL_SIZE {
            return Err(TaskError::invalid_config(format!(
                "pool size {} exceeds maximum of {MAX_POOL_SIZE}",
                self.size
            )));
        }
        Ok(())
    }
}

/// Outcome of a bounded shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Threads that exited before the deadline and were joined.
    pub joined: usize,
    /// Threads still running at the deadline; detached, not joined.
    pub abandoned: usize,
}

impl ShutdownReport {
    /// Returns `true` if no thread had to be abandoned.
    pub fn is_clean(&self) -> bool {
        self.abandoned == 0
    }

    /// Adds the counts of another report to this one.
    pub fn merge(self, other: Self) -> Self {
        Self {
            joined: self.joined + other.joined,
            abandoned: self.abandoned + other.abandoned,
        }
    }
}

/// Counting wake-up signal: one permit per submitted job.
#[derive(Default)]
struct WakeSignal {
    permits: Mutex<usize>,
    cond: Condvar,
}

impl WakeSignal {
    fn notify(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.cond.notify_one();
    }

    /// Blocks until a permit is available or `shutdown` is cancelled.
    /// Returns `false` on cancellation.
    fn wait(&self, shutdown: &CancellationToken) -> bool {
        let mut permits = self.permits.lock();
        loop {
            if shutdown.is_cancelled() {
                return false;
            }
            if *permits > 0 {
                *permits -= 1;
                return true;
            }
            self.cond.wait(&mut permits);
        }
    }

    /// Wakes every waiter so it can re-check its shutdown token.
    fn interrupt(&self) {
        let _permits = self.permits.lock();
        self.cond.notify_all();
    }
}

struct PoolShared {
    queue: JobQueue<Job>,
    wake: WakeSignal,
    stats: TaskStats,
}

struct Worker {
    id: usize,
    handle: JoinHandle<()>,
    exited: Arc<Signal>,
}

/// Sets the worker's exit signal when the thread leaves its loop.
struct ExitGuard(Arc<Signal>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

struct PoolRun {
    shutdown: CancellationToken,
    workers: Vec<Worker>,
}

/// A bounded set of worker threads fed from one FIFO queue.
///
/// # Example
///
/// ```rust
/// use harbor_tasks::{CancellationToken, TaskState, WorkerPool};
///
/// let pool = WorkerPool::new(2).unwrap();
/// pool.start().unwrap();
///
/// let token = CancellationToken::new();
/// let task = pool.submit(|| Ok::<_, std::io::Error>(()), token);
/// assert_eq!(task.wait(), TaskState::Finished);
///
/// let report = pool.stop_default();
/// assert!(report.is_clean());
/// ```
pub struct WorkerPool {
    config: PoolConfig,
    shared: Arc<PoolShared>,
    run: Mutex<Option<PoolRun>>,
}

impl WorkerPool {
    /// Creates a pool with `size` workers and default settings otherwise.
    ///
    /// Sizes outside `0..=32` are rejected.
    pub fn new(size: i64) -> TaskResult<Self> {
        Self::with_config(PoolConfig::sized(size)?)
    }

    /// Creates a pool from a full configuration.
    pub fn with_config(config: PoolConfig) -> TaskResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shared: Arc::new(PoolShared {
                queue: JobQueue::new(),
                wake: WakeSignal::default(),
                stats: TaskStats::new(),
            }),
            run: Mutex::new(None),
        })
    }

    /// Configured number of workers.
    pub fn size(&self) -> usize {
        self.config.size
    }

    /// The pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns `true` between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Number of jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Task statistics since construction.
    pub fn stats(&self) -> &TaskStats {
        &self.shared.stats
    }

    /// Starts the workers, stopping any previous set first.
    pub fn start(&self) -> TaskResult<()> {
        self.stop(self.config.shutdown_timeout);

        let shutdown = CancellationToken::new();
        let mut workers = Vec::with_capacity(self.config.size);

        for id in 0..self.config.size {
            match self.spawn_worker(id, shutdown.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    error!(worker = id, error = %e, "failed to spawn worker");
                    let partial = PoolRun { shutdown, workers };
                    self.shutdown_run(partial, self.config.shutdown_timeout);
                    return Err(e);
                }
            }
        }

        info!(workers = self.config.size, "worker pool started");
        *self.run.lock() = Some(PoolRun { shutdown, workers });
        Ok(())
    }

    /// Signals shutdown and waits up to `timeout` for every worker.
    ///
    /// Workers still busy at the deadline are detached and counted as
    /// abandoned; they exit on their own once their current job returns.
    /// Jobs still queued stay queued for the next `start`; if the pool is
    /// dropped instead, they end `Cancelled`. Calling `stop` on a stopped
    /// pool is a no-op.
    pub fn stop(&self, timeout: Duration) -> ShutdownReport {
        let run = self.run.lock().take();
        match run {
            Some(run) => self.shutdown_run(run, timeout),
            None => ShutdownReport::default(),
        }
    }

    /// [`stop`](Self::stop) with the configured shutdown timeout.
    pub fn stop_default(&self) -> ShutdownReport {
        self.stop(self.config.shutdown_timeout)
    }

    /// Queues `action` and returns its handle without waiting for it to run.
    ///
    /// If `token` is cancelled before a worker picks the job up, the action
    /// is dropped unrun and the task ends `Cancelled`.
    pub fn submit<F, E>(&self, action: F, token: CancellationToken) -> Task
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        let task = Task::new(token);
        let job = Job::new(task.clone(), Box::new(move || action().map_err(Into::into)));

        self.shared.stats.record_submit();
        self.shared.queue.enqueue(job);
        self.shared.wake.notify();

        trace!(task_id = %task.id(), "task submitted");
        task
    }

    /// Queues `action` with a token that is never cancelled.
    pub fn execute<F, E>(&self, action: F) -> Task
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.submit(action, CancellationToken::new())
    }

    fn spawn_worker(&self, id: usize, shutdown: CancellationToken) -> TaskResult<Worker> {
        let shared = Arc::clone(&self.shared);
        let exited = Arc::new(Signal::new());
        let guard = ExitGuard(Arc::clone(&exited));

        let handle = thread::Builder::new()
            .name(format!("{}-{id}", self.config.thread_name_prefix))
            .spawn(move || {
                let _guard = guard;
                worker_loop(id, &shared, &shutdown);
            })
            .map_err(|e| TaskError::spawn_failed(e.to_string()))?;

        Ok(Worker { id, handle, exited })
    }

    fn shutdown_run(&self, run: PoolRun, timeout: Duration) -> ShutdownReport {
        let PoolRun { shutdown, workers } = run;
        shutdown.cancel();
        self.shared.wake.interrupt();

        let deadline = Instant::now().checked_add(timeout);
        let mut report = ShutdownReport::default();

        for worker in workers {
            let exited = match deadline {
                Some(deadline) => worker.exited.wait_until(deadline),
                None => {
                    worker.exited.wait();
                    true
                }
            };

            if exited {
                if worker.handle.join().is_err() {
                    warn!(worker = worker.id, "worker thread panicked");
                }
                report.joined += 1;
            } else {
                warn!(
                    worker = worker.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "worker did not stop in time, detaching"
                );
                report.abandoned += 1;
            }
        }

        info!(
            joined = report.joined,
            abandoned = report.abandoned,
            pending = self.shared.queue.len(),
            "worker pool stopped"
        );
        report
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            self.shutdown_run(run, self.config.shutdown_timeout);
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.config.size)
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish()
    }
}

fn worker_loop(id: usize, shared: &PoolShared, shutdown: &CancellationToken) {
    debug!(worker = id, "worker started");
    while shared.wake.wait(shutdown) {
        // Lost the race for this permit's job; block again.
        let Some(job) = shared.queue.try_dequeue() else {
            continue;
        };
        let state = job.run(&shared.stats);
        trace!(worker = id, state = %state, "job done");
    }
    debug!(worker = id, "worker exiting");
}
