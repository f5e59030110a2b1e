//! Task identity, state machine and statistics.
//!
//! A [`Task`] is the caller-visible handle onto one submitted unit of work.
//! Its state moves exactly once from [`TaskState::Initial`] to one of the
//! terminal states, and its completion signal is raised only after the
//! terminal state has been recorded.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BoxError, TaskError};
use crate::signal::{CancellationToken, Signal};

/// The boxed action carried by a job.
pub(crate) type Action = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Submitted, not yet picked up by a worker.
    Initial,
    /// A worker is executing the action.
    Running,
    /// Cancellation was requested before the action started.
    Cancelled,
    /// The action completed without error.
    Finished,
    /// The action returned an error or panicked.
    Failed,
}

impl TaskState {
    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Finished | Self::Failed)
    }

    /// Check if the task is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if the task finished successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Check if the task failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Running => write!(f, "running"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug)]
struct TaskRecord {
    state: TaskState,
    error: Option<TaskError>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct TaskShared {
    id: TaskId,
    created_at: DateTime<Utc>,
    token: CancellationToken,
    record: Mutex<TaskRecord>,
    completed: Signal,
}

/// Handle to a submitted unit of work.
///
/// Cloning the handle is cheap; every clone observes the same task.
///
/// # Example
///
/// ```rust
/// use harbor_tasks::{TaskState, WorkerPool};
///
/// let pool = WorkerPool::new(1).unwrap();
/// pool.start().unwrap();
///
/// let task = pool.execute(|| Ok::<_, std::io::Error>(()));
/// assert_eq!(task.wait(), TaskState::Finished);
/// assert!(task.failure().is_none());
///
/// pool.stop_default();
/// ```
#[derive(Debug, Clone)]
pub struct Task {
    shared: Arc<TaskShared>,
}

impl Task {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self {
            shared: Arc::new(TaskShared {
                id: TaskId::new(),
                created_at: Utc::now(),
                token,
                record: Mutex::new(TaskRecord {
                    state: TaskState::Initial,
                    error: None,
                    started_at: None,
                    finished_at: None,
                }),
                completed: Signal::new(),
            }),
        }
    }

    /// Get the task ID.
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    /// Get the current state.
    pub fn state(&self) -> TaskState {
        self.shared.record.lock().state
    }

    /// Get the captured failure, if the action raised one.
    pub fn failure(&self) -> Option<TaskError> {
        self.shared.record.lock().error.clone()
    }

    /// The cancellation token checked when execution starts.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.shared.token
    }

    /// Requests cancellation.
    ///
    /// Only effective if no worker has started the task yet.
    pub fn cancel(&self) {
        self.shared.token.cancel();
    }

    /// Returns `true` once the completion signal is set.
    pub fn is_complete(&self) -> bool {
        self.shared.completed.is_set()
    }

    /// Blocks until the task reaches a terminal state and returns it.
    pub fn wait(&self) -> TaskState {
        self.shared.completed.wait();
        self.state()
    }

    /// Blocks until the task completes or `timeout` elapses.
    ///
    /// Returns whether the task completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.shared.completed.wait_timeout(timeout)
    }

    /// When the task was submitted.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.shared.created_at
    }

    /// When a worker started the action.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.shared.record.lock().started_at
    }

    /// When the task reached its terminal state.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.shared.record.lock().finished_at
    }

    /// Execution time of the action, once it has run.
    pub fn duration(&self) -> Option<Duration> {
        let record = self.shared.record.lock();
        let started = record.started_at?;
        let finished = record.finished_at?;
        (finished - started).to_std().ok()
    }

    fn mark_running(&self) {
        let mut record = self.shared.record.lock();
        record.state = TaskState::Running;
        record.started_at = Some(Utc::now());
    }

    fn mark_terminal(&self, state: TaskState, error: Option<TaskError>) {
        let mut record = self.shared.record.lock();
        if record.state.is_terminal() {
            return;
        }
        record.state = state;
        record.error = error;
        record.finished_at = Some(Utc::now());
    }
}

/// Raises the completion signal when dropped, including during unwinding.
struct CompletionGuard<'a> {
    task: &'a Task,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if !self.task.state().is_terminal() {
            self.task.mark_terminal(
                TaskState::Failed,
                Some(TaskError::panicked("task aborted before reaching a terminal state")),
            );
        }
        self.task.shared.completed.set();
    }
}

/// One queued unit of work: the handle plus the action it owns.
///
/// A job dropped without running (pool dropped with jobs still queued) ends
/// `Cancelled` and raises its completion signal.
pub(crate) struct Job {
    task: Task,
    action: Option<Action>,
}

impl Job {
    pub(crate) fn new(task: Task, action: Action) -> Self {
        Self {
            task,
            action: Some(action),
        }
    }

    /// Executes the job to a terminal state. Consumes the job, so the action
    /// can run at most once.
    pub(crate) fn run(mut self, stats: &TaskStats) -> TaskState {
        let Some(action) = self.action.take() else {
            return self.task.state();
        };
        let task = &self.task;
        let _completion = CompletionGuard { task };
        let id = task.id();

        if task.shared.token.is_cancelled() {
            drop(action);
            task.mark_terminal(TaskState::Cancelled, None);
            stats.record_cancelled();
            debug!(task_id = %id, "task cancelled before start");
            return TaskState::Cancelled;
        }

        task.mark_running();
        stats.record_started();

        match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => {
                task.mark_terminal(TaskState::Finished, None);
                stats.record_finished();
                debug!(task_id = %id, "task finished");
                TaskState::Finished
            }
            Ok(Err(e)) => {
                let error = TaskError::failed(e.to_string());
                warn!(task_id = %id, error = %error, "task failed");
                task.mark_terminal(TaskState::Failed, Some(error));
                stats.record_failed();
                TaskState::Failed
            }
            Err(payload) => {
                let error = TaskError::from_panic(payload.as_ref());
                warn!(task_id = %id, error = %error, "task panicked");
                task.mark_terminal(TaskState::Failed, Some(error));
                stats.record_failed();
                TaskState::Failed
            }
        }
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        let Some(action) = self.action.take() else {
            return;
        };
        // Release whatever the action captured before waking waiters.
        drop(action);
        self.task.mark_terminal(TaskState::Cancelled, None);
        self.task.shared.completed.set();
        debug!(task_id = %self.task.id(), "task dropped before start");
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("task", &self.task.id()).finish()
    }
}

/// Task execution statistics.
#[derive(Debug, Default)]
pub struct TaskStats {
    /// Total tasks submitted.
    pub submitted: AtomicU64,
    /// Tasks whose action completed successfully.
    pub finished: AtomicU64,
    /// Tasks whose action failed or panicked.
    pub failed: AtomicU64,
    /// Tasks cancelled before start.
    pub cancelled: AtomicU64,
    /// Currently running tasks.
    pub running: AtomicU64,
}

impl TaskStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task submission.
    pub fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task starting its action.
    pub fn record_started(&self) {
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful completion.
    pub fn record_finished(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
        self.running.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a failure.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.running.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a cancellation. Cancelled tasks never start running.
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total submitted count.
    pub fn total_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Get finished count.
    pub fn total_finished(&self) -> u64 {
        self.finished.load(Ordering::Relaxed)
    }

    /// Get failed count.
    pub fn total_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Get cancelled count.
    pub fn total_cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Get count of tasks in any terminal state.
    pub fn total_terminal(&self) -> u64 {
        self.total_finished() + self.total_failed() + self.total_cancelled()
    }

    /// Get currently running count.
    pub fn currently_running(&self) -> u64 {
        self.running.load(Ordering::Relaxed)
    }
}
