//! Worker pool integration tests.
//!
//! These tests exercise the pool through its public API only:
//!
//! - Submission returns immediately even when every worker is busy
//! - Each job runs exactly once under concurrent submission
//! - Failing and panicking jobs do not take workers down
//! - Shutdown is bounded and reports detached workers
//! - A stopped pool can be started again

use harbor_tasks::{
    CancellationToken, PoolConfig, ShutdownReport, Signal, Task, TaskError, TaskState, WorkerPool,
};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn ok() -> Result<(), io::Error> {
    Ok(())
}

/// Submits a job that blocks until `gate` is set.
fn blocking_job(pool: &WorkerPool, gate: &Arc<Signal>) -> Task {
    let gate = gate.clone();
    pool.execute(move || {
        gate.wait();
        ok()
    })
}

#[test]
fn submit_does_not_wait_for_busy_workers() {
    let pool = WorkerPool::new(1).unwrap();
    pool.start().unwrap();

    let gate = Arc::new(Signal::new());
    let busy = blocking_job(&pool, &gate);

    let start = Instant::now();
    let queued = pool.execute(ok);
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(queued.state(), TaskState::Initial);

    gate.set();
    assert_eq!(busy.wait(), TaskState::Finished);
    assert_eq!(queued.wait(), TaskState::Finished);

    pool.stop_default();
}

#[test]
fn every_job_runs_exactly_once_under_concurrent_submission() {
    const WORKERS: usize = 4;
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = WORKERS * 25;
    const JOBS: usize = PRODUCERS * PER_PRODUCER;

    let pool = Arc::new(WorkerPool::with_config(PoolConfig::new().with_size(WORKERS)).unwrap());
    pool.start().unwrap();

    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..JOBS).map(|_| AtomicUsize::new(0)).collect());
    let in_flight: Arc<Vec<AtomicBool>> =
        Arc::new((0..JOBS).map(|_| AtomicBool::new(false)).collect());
    let overlaps = Arc::new(AtomicUsize::new(0));
    let go = Arc::new(Signal::new());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let pool = pool.clone();
            let runs = runs.clone();
            let in_flight = in_flight.clone();
            let overlaps = overlaps.clone();
            let go = go.clone();
            std::thread::spawn(move || {
                go.wait();
                (0..PER_PRODUCER)
                    .map(|n| {
                        let i = p * PER_PRODUCER + n;
                        let runs = runs.clone();
                        let in_flight = in_flight.clone();
                        let overlaps = overlaps.clone();
                        pool.execute(move || {
                            if in_flight[i].swap(true, Ordering::SeqCst) {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            runs[i].fetch_add(1, Ordering::SeqCst);
                            std::thread::yield_now();
                            in_flight[i].store(false, Ordering::SeqCst);
                            ok()
                        })
                    })
                    .collect::<Vec<Task>>()
            })
        })
        .collect();

    go.set();
    let tasks: Vec<Task> = producers
        .into_iter()
        .flat_map(|producer| producer.join().unwrap())
        .collect();
    assert_eq!(tasks.len(), JOBS);

    for task in &tasks {
        assert!(task.wait_timeout(Duration::from_secs(10)));
        assert_eq!(task.state(), TaskState::Finished);
    }
    for (i, count) in runs.iter().enumerate() {
        assert_eq!(count.load(Ordering::SeqCst), 1, "job {i} ran a wrong number of times");
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);

    let stats = pool.stats();
    assert_eq!(stats.total_submitted(), JOBS as u64);
    assert_eq!(stats.total_terminal(), JOBS as u64);
    assert_eq!(stats.currently_running(), 0);

    pool.stop_default();
}

#[test]
fn failing_and_panicking_jobs_leave_workers_alive() {
    let pool = WorkerPool::new(1).unwrap();
    pool.start().unwrap();

    let failed = pool.execute(|| Err(io::Error::other("refused")));
    let panicked = pool.execute(|| -> Result<(), io::Error> { panic!("worker must survive") });
    let after = pool.execute(ok);

    assert_eq!(failed.wait(), TaskState::Failed);
    assert!(matches!(failed.failure(), Some(TaskError::Failed(_))));

    assert_eq!(panicked.wait(), TaskState::Failed);
    assert!(matches!(panicked.failure(), Some(TaskError::Panicked(_))));

    assert_eq!(after.wait(), TaskState::Finished);

    assert_eq!(pool.stop_default(), ShutdownReport { joined: 1, abandoned: 0 });
}

#[test]
fn stop_is_bounded_and_reports_abandoned_workers() {
    let pool = WorkerPool::new(2).unwrap();
    pool.start().unwrap();

    let gate = Arc::new(Signal::new());
    let stuck = blocking_job(&pool, &gate);
    assert!(wait_for(|| stuck.state() == TaskState::Running));

    let start = Instant::now();
    let report = pool.stop(Duration::from_millis(200));
    let elapsed = start.elapsed();

    assert_eq!(report, ShutdownReport { joined: 1, abandoned: 1 });
    assert!(elapsed < Duration::from_secs(2), "stop took {elapsed:?}");
    assert!(!pool.is_running());

    // The detached worker still finishes its job.
    gate.set();
    assert_eq!(stuck.wait(), TaskState::Finished);
}

#[test]
fn cancelling_a_started_task_does_not_interrupt_it() {
    let pool = WorkerPool::new(1).unwrap();
    pool.start().unwrap();

    let token = CancellationToken::new();
    let started = Arc::new(Signal::new());
    let started_clone = started.clone();
    let inner = token.clone();
    let task = pool.submit(
        move || {
            started_clone.set();
            inner.cancel();
            std::thread::sleep(Duration::from_millis(20));
            ok()
        },
        token,
    );

    assert!(started.wait_timeout(Duration::from_secs(2)));
    assert_eq!(task.wait(), TaskState::Finished);

    pool.stop_default();
}

#[test]
fn jobs_queued_while_stopped_run_after_restart() {
    let pool = WorkerPool::new(2).unwrap();
    pool.start().unwrap();
    pool.stop_default();

    let task = pool.execute(ok);
    assert!(!task.wait_timeout(Duration::from_millis(50)));
    assert_eq!(pool.pending(), 1);

    pool.start().unwrap();
    assert_eq!(task.wait(), TaskState::Finished);
    assert_eq!(pool.pending(), 0);

    pool.stop_default();
}

#[test]
fn jobs_pending_when_the_pool_is_dropped_end_cancelled() {
    let pool = WorkerPool::new(1).unwrap();
    pool.start().unwrap();

    let busy = pool.execute(|| {
        std::thread::sleep(Duration::from_millis(300));
        ok()
    });
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = ran.clone();
    let queued = pool.execute(move || {
        ran_clone.fetch_add(1, Ordering::SeqCst);
        ok()
    });
    assert!(wait_for(|| busy.state() == TaskState::Running));

    let report = pool.stop(Duration::from_millis(1000));
    assert_eq!(report, ShutdownReport { joined: 1, abandoned: 0 });
    assert_eq!(busy.state(), TaskState::Finished);
    assert_eq!(queued.state(), TaskState::Initial);

    drop(pool);
    assert!(queued.wait_timeout(Duration::from_secs(2)));
    assert_eq!(queued.state(), TaskState::Cancelled);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn cancelled_queued_jobs_are_skipped() {
    let pool = WorkerPool::new(1).unwrap();
    pool.start().unwrap();

    let gate = Arc::new(Signal::new());
    let busy = blocking_job(&pool, &gate);

    let token = CancellationToken::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let queued: Vec<Task> = (0..3)
        .map(|_| {
            let ran = ran.clone();
            pool.submit(
                move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                    ok()
                },
                token.clone(),
            )
        })
        .collect();

    token.cancel();
    gate.set();

    assert_eq!(busy.wait(), TaskState::Finished);
    for task in &queued {
        assert_eq!(task.wait(), TaskState::Cancelled);
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    pool.stop_default();
}

#[test]
fn restart_replaces_workers() {
    let pool = WorkerPool::new(3).unwrap();
    pool.start().unwrap();
    pool.start().unwrap();
    assert!(pool.is_running());

    let task = pool.execute(ok);
    assert_eq!(task.wait(), TaskState::Finished);

    assert_eq!(pool.stop_default(), ShutdownReport { joined: 3, abandoned: 0 });
}

#[test]
fn pool_size_limits() {
    for bad in [-1_i64, -100, 33, 1000] {
        assert!(
            matches!(WorkerPool::new(bad), Err(TaskError::InvalidConfig(_))),
            "size {bad} should be rejected"
        );
    }
    for good in [0_i64, 1, 3, 32] {
        let pool = WorkerPool::new(good).unwrap();
        assert_eq!(pool.size() as i64, good);
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
