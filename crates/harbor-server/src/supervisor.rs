//! Listener supervisor.
//!
//! The supervisor keeps a listener alive for as long as it runs. It owns two
//! kinds of threads:
//!
//! - **`harbor-accept`**: the outer loop. Binds the listener, backs off on
//!   bind failure, and restarts the listener whenever the accept loop ends.
//! - **`harbor-accept-loop`**: one per listener cycle. Accepts connections
//!   and submits each one to the worker pool.
//!
//! Every accepted connection becomes one pool job that calls the handler and
//! then releases the connection, whether the handler returned, erred or
//! panicked.
//!
//! # Example
//!
//! ```rust,no_run
//! use harbor_server::{HandlerError, ServerConfig, Supervisor, TcpConnection};
//! use std::io::Write;
//!
//! let config = ServerConfig::builder().port(8080).build();
//! let transport = config.tcp_transport();
//! let supervisor = Supervisor::new(config, transport, |conn: &mut TcpConnection| {
//!     conn.write_all(b"HTTP/1.1 204 No Content\r\n\r\n")?;
//!     Ok::<_, HandlerError>(())
//! })
//! .unwrap();
//!
//! supervisor.start().unwrap();
//! // ...
//! let report = supervisor.stop();
//! assert!(report.is_clean());
//! ```

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use harbor_tasks::{CancellationToken, ShutdownReport, Signal, WorkerPool};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{ConnectionHandler, HandlerError};
use crate::transport::{Connection, Listener, Transport};

/// Connection type produced by a transport's listener.
pub type TransportConnection<T> = <<T as Transport>::Listener as Listener>::Connection;

/// Observable lifecycle of a [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not started, or fully stopped.
    Stopped,
    /// Trying to bind the listener.
    Binding,
    /// Listener bound and accepting.
    Serving,
    /// Binding keeps failing; still retrying at the capped delay.
    Degraded,
    /// `stop` in progress.
    Stopping,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Binding => write!(f, "binding"),
            Self::Serving => write!(f, "serving"),
            Self::Degraded => write!(f, "degraded"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

struct Shared<T, H> {
    config: ServerConfig,
    transport: T,
    handler: Arc<H>,
    pool: Arc<WorkerPool>,
    state: Mutex<SupervisorState>,
    bind_failures: AtomicU32,
    bind_attempts: AtomicU64,
}

impl<T, H> Shared<T, H> {
    fn state(&self) -> SupervisorState {
        *self.state.lock()
    }

    /// Moves to `next` unless a stop is already underway.
    fn transition(&self, next: SupervisorState) {
        let mut state = self.state.lock();
        if *state == SupervisorState::Stopping && next != SupervisorState::Stopped {
            return;
        }
        *state = next;
    }

    /// Transition requested from inside the run owning `run`.
    ///
    /// Ignored once that run is cancelled, so a detached accept thread
    /// cannot move a stopped or restarted supervisor.
    fn advance(&self, run: &CancellationToken, next: SupervisorState) {
        let mut state = self.state.lock();
        if run.is_cancelled() || *state == SupervisorState::Stopping {
            return;
        }
        *state = next;
    }
}

/// Sets a signal and cancels a token when dropped.
struct ExitGuard {
    exited: Arc<Signal>,
    cycle: Option<CancellationToken>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if let Some(cycle) = &self.cycle {
            cycle.cancel();
        }
        self.exited.set();
    }
}

/// Closes the connection when the job ends, however it ends.
struct ConnectionGuard<C: Connection>(C);

impl<C: Connection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        self.0.close();
    }
}

struct SupervisorRun {
    token: CancellationToken,
    thread: JoinHandle<ShutdownReport>,
    exited: Arc<Signal>,
}

/// Keeps a listener alive and feeds its connections to a worker pool.
pub struct Supervisor<T, H>
where
    T: Transport,
    H: ConnectionHandler<TransportConnection<T>>,
{
    shared: Arc<Shared<T, H>>,
    run: Mutex<Option<SupervisorRun>>,
}

impl<T, H> Supervisor<T, H>
where
    T: Transport,
    H: ConnectionHandler<TransportConnection<T>>,
{
    /// Creates a supervisor with its own worker pool sized from `config`.
    ///
    /// Fails if the configured pool size is out of range.
    pub fn new(config: ServerConfig, transport: T, handler: H) -> ServerResult<Self> {
        let pool = WorkerPool::with_config(config.pool_config()?)?;
        Ok(Self::with_pool(config, transport, handler, Arc::new(pool)))
    }

    /// Creates a supervisor that dispatches onto an existing pool.
    ///
    /// The supervisor starts and stops the pool with itself.
    pub fn with_pool(config: ServerConfig, transport: T, handler: H, pool: Arc<WorkerPool>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                handler: Arc::new(handler),
                pool,
                state: Mutex::new(SupervisorState::Stopped),
                bind_failures: AtomicU32::new(0),
                bind_attempts: AtomicU64::new(0),
            }),
            run: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        self.shared.state()
    }

    /// Consecutive bind failures since the last successful bind.
    pub fn bind_failures(&self) -> u32 {
        self.shared.bind_failures.load(Ordering::Relaxed)
    }

    /// Total bind attempts since construction.
    pub fn bind_attempts(&self) -> u64 {
        self.shared.bind_attempts.load(Ordering::Relaxed)
    }

    /// The worker pool connections are dispatched to.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.shared.pool
    }

    /// The supervisor configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Returns `true` between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Starts the pool and the accept thread, stopping a previous run first.
    pub fn start(&self) -> ServerResult<()> {
        self.stop();

        self.shared.pool.start()?;

        let token = CancellationToken::new();
        let exited = Arc::new(Signal::new());
        let guard = ExitGuard {
            exited: Arc::clone(&exited),
            cycle: None,
        };
        let shared = Arc::clone(&self.shared);
        let outer_token = token.clone();

        self.shared.transition(SupervisorState::Binding);
        let spawned = thread::Builder::new()
            .name("harbor-accept".to_string())
            .spawn(move || {
                let _guard = guard;
                supervise(&shared, &outer_token)
            });

        let thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "failed to spawn accept thread");
                self.shared.pool.stop(self.shared.config.pool_shutdown_timeout());
                self.shared.transition(SupervisorState::Stopped);
                return Err(ServerError::spawn("accept", e));
            }
        };

        info!(
            port = self.shared.config.port(),
            workers = self.shared.pool.size(),
            tls = self.shared.config.tls().is_some(),
            "supervisor started"
        );
        *self.run.lock() = Some(SupervisorRun {
            token,
            thread,
            exited,
        });
        Ok(())
    }

    /// Stops accepting, then stops the pool. Bounded by the configured
    /// timeouts; threads that miss them are detached and counted as
    /// abandoned. Safe to call when not running.
    pub fn stop(&self) -> ShutdownReport {
        let Some(run) = self.run.lock().take() else {
            return ShutdownReport::default();
        };

        self.shared.transition(SupervisorState::Stopping);
        run.token.cancel();

        // The outer thread may itself spend one timeout joining the accept loop.
        let timeout = self.shared.config.shutdown_timeout().saturating_mul(2);
        let mut report = ShutdownReport::default();
        if run.exited.wait_timeout(timeout) {
            match run.thread.join() {
                Ok(inner) => report = report.merge(inner),
                Err(_) => warn!("accept thread panicked"),
            }
            report.joined += 1;
        } else {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "accept thread did not stop in time, detaching"
            );
            report.abandoned += 1;
        }

        let pool_report = self
            .shared
            .pool
            .stop(self.shared.config.pool_shutdown_timeout());
        let report = report.merge(pool_report);

        self.shared.transition(SupervisorState::Stopped);
        info!(
            joined = report.joined,
            abandoned = report.abandoned,
            "supervisor stopped"
        );
        report
    }
}

impl<T, H> Drop for Supervisor<T, H>
where
    T: Transport,
    H: ConnectionHandler<TransportConnection<T>>,
{
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T, H> fmt::Debug for Supervisor<T, H>
where
    T: Transport,
    H: ConnectionHandler<TransportConnection<T>>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("port", &self.shared.config.port())
            .field("state", &self.state())
            .field("bind_failures", &self.bind_failures())
            .field("pool", &self.shared.pool)
            .finish()
    }
}

/// Outer loop: bind, serve until the cycle ends, repeat until cancelled.
fn supervise<T, H>(shared: &Arc<Shared<T, H>>, token: &CancellationToken) -> ShutdownReport
where
    T: Transport,
    H: ConnectionHandler<TransportConnection<T>>,
{
    let port = shared.config.port();
    let policy = *shared.config.restart();
    let mut report = ShutdownReport::default();

    while !token.is_cancelled() {
        if shared.state() != SupervisorState::Degraded {
            shared.advance(token, SupervisorState::Binding);
        }
        shared.bind_attempts.fetch_add(1, Ordering::Relaxed);

        let failure = match shared.transport.bind(port, shared.config.tls()) {
            Ok(listener) => {
                shared.bind_failures.store(0, Ordering::Relaxed);
                shared.advance(token, SupervisorState::Serving);
                info!(port, "listener serving");

                match serve(shared, listener, token) {
                    Ok(cycle) => {
                        report = report.merge(cycle);
                        if token.is_cancelled() {
                            break;
                        }
                        warn!(port, "accept loop ended, restarting listener");
                        // Pause before rebinding so a listener that dies at
                        // once does not spin this thread.
                        token.wait_timeout(policy.delay(0));
                        continue;
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        let failures = shared.bind_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let delay = policy.delay(failures - 1);
        let delay_ms = delay.as_millis() as u64;

        if policy.is_degraded(failures) {
            shared.advance(token, SupervisorState::Degraded);
            error!(port, attempt = failures, delay_ms, error = %failure, "listener start keeps failing");
        } else {
            warn!(port, attempt = failures, delay_ms, error = %failure, "listener start failed, retrying");
        }

        token.wait_timeout(delay);
    }

    debug!(port, "supervisor loop exiting");
    report
}

/// Runs one listener cycle and tears it down.
///
/// Returns once the supervisor is cancelled or the accept loop ends, after
/// stopping the listener and joining (or detaching) the accept loop thread.
fn serve<T, H>(
    shared: &Arc<Shared<T, H>>,
    listener: T::Listener,
    token: &CancellationToken,
) -> io::Result<ShutdownReport>
where
    T: Transport,
    H: ConnectionHandler<TransportConnection<T>>,
{
    let listener = Arc::new(listener);
    let cycle = token.child_token();
    let done = Arc::new(Signal::new());

    let guard = ExitGuard {
        exited: Arc::clone(&done),
        cycle: Some(cycle.clone()),
    };
    let loop_shared = Arc::clone(shared);
    let loop_listener = Arc::clone(&listener);
    let loop_cycle = cycle.clone();
    let run_token = token.clone();

    let handle = match thread::Builder::new()
        .name("harbor-accept-loop".to_string())
        .spawn(move || {
            let _guard = guard;
            accept_loop(&loop_shared, &*loop_listener, &loop_cycle, &run_token);
        }) {
        Ok(handle) => handle,
        Err(e) => {
            listener.stop();
            return Err(e);
        }
    };

    cycle.wait();
    listener.stop();

    let timeout = shared.config.shutdown_timeout();
    let mut report = ShutdownReport::default();
    if done.wait_timeout(timeout) {
        if handle.join().is_err() {
            warn!("accept loop thread panicked");
        }
        report.joined += 1;
    } else {
        warn!(
            timeout_ms = timeout.as_millis() as u64,
            "accept loop did not stop in time, detaching"
        );
        report.abandoned += 1;
    }
    Ok(report)
}

/// Inner loop: accept until the listener stops or the cycle is cancelled.
fn accept_loop<T, H>(
    shared: &Arc<Shared<T, H>>,
    listener: &T::Listener,
    cycle: &CancellationToken,
    run_token: &CancellationToken,
) where
    T: Transport,
    H: ConnectionHandler<TransportConnection<T>>,
{
    while listener.is_listening() && !cycle.is_cancelled() {
        match listener.accept() {
            Ok(Some(conn)) => dispatch(shared, conn, run_token),
            Ok(None) => break,
            Err(e) if !listener.is_listening() => {
                debug!(error = %e, "accept interrupted by stop");
                break;
            }
            Err(e) if is_transient(&e) => {
                debug!(error = %e, "transient accept error");
            }
            Err(e) => {
                warn!(port = shared.config.port(), error = %e, "accept failed");
                break;
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

/// Submits one connection to the pool.
///
/// Jobs carry the supervisor's run token, so connections still queued when
/// the supervisor stops are dropped without reaching the handler. The
/// connection is guarded before submission, so a job that never runs still
/// closes it.
fn dispatch<T, H>(shared: &Arc<Shared<T, H>>, conn: TransportConnection<T>, token: &CancellationToken)
where
    T: Transport,
    H: ConnectionHandler<TransportConnection<T>>,
{
    let handler = Arc::clone(&shared.handler);
    let guard = ConnectionGuard(conn);
    let task = shared.pool.submit(
        move || handle_connection(&*handler, guard),
        token.clone(),
    );
    trace!(task_id = %task.id(), "connection dispatched");
}

fn handle_connection<C, H>(handler: &H, mut guard: ConnectionGuard<C>) -> Result<(), HandlerError>
where
    C: Connection,
    H: ConnectionHandler<C>,
{
    handler.handle(&mut guard.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counted {
        closes: Arc<AtomicUsize>,
    }

    impl Connection for Counted {
        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SupervisorState::Serving.to_string(), "serving");
        assert_eq!(SupervisorState::Degraded.to_string(), "degraded");
    }

    #[test]
    fn test_connection_closed_after_handler_ok() {
        let closes = Arc::new(AtomicUsize::new(0));
        let handler = |_: &mut Counted| -> Result<(), HandlerError> { Ok(()) };

        handle_connection(&handler, ConnectionGuard(Counted { closes: closes.clone() })).unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connection_closed_after_handler_error() {
        let closes = Arc::new(AtomicUsize::new(0));
        let handler =
            |_: &mut Counted| -> Result<(), HandlerError> { Err(HandlerError::custom("bad request")) };

        assert!(handle_connection(&handler, ConnectionGuard(Counted { closes: closes.clone() })).is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connection_closed_after_handler_panic() {
        let closes = Arc::new(AtomicUsize::new(0));
        let conn = ConnectionGuard(Counted { closes: closes.clone() });
        let handler = |_: &mut Counted| -> Result<(), HandlerError> { panic!("handler bug") };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handle_connection(&handler, conn)
        }));
        assert!(result.is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exit_guard_cancels_cycle() {
        let exited = Arc::new(Signal::new());
        let cycle = CancellationToken::new();
        drop(ExitGuard {
            exited: exited.clone(),
            cycle: Some(cycle.clone()),
        });

        assert!(exited.is_set());
        assert!(cycle.is_cancelled());
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_transition_ignored_while_stopping() {
        let shared = Shared {
            config: ServerConfig::default(),
            transport: (),
            handler: Arc::new(()),
            pool: Arc::new(WorkerPool::new(0).unwrap()),
            state: Mutex::new(SupervisorState::Stopping),
            bind_failures: AtomicU32::new(0),
            bind_attempts: AtomicU64::new(0),
        };

        shared.transition(SupervisorState::Serving);
        assert_eq!(shared.state(), SupervisorState::Stopping);

        shared.transition(SupervisorState::Stopped);
        assert_eq!(shared.state(), SupervisorState::Stopped);
    }

    #[test]
    fn test_cancelled_run_cannot_leave_stopped() {
        let shared = Shared {
            config: ServerConfig::default(),
            transport: (),
            handler: Arc::new(()),
            pool: Arc::new(WorkerPool::new(0).unwrap()),
            state: Mutex::new(SupervisorState::Stopped),
            bind_failures: AtomicU32::new(0),
            bind_attempts: AtomicU64::new(0),
        };
        let old_run = CancellationToken::new();
        old_run.cancel();

        shared.advance(&old_run, SupervisorState::Binding);
        shared.advance(&old_run, SupervisorState::Serving);
        assert_eq!(shared.state(), SupervisorState::Stopped);

        let live_run = CancellationToken::new();
        shared.advance(&live_run, SupervisorState::Binding);
        assert_eq!(shared.state(), SupervisorState::Binding);
    }

    #[test]
    fn test_unrun_job_still_closes_connection() {
        let closes = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(1).unwrap();
        let handler = Arc::new(|_: &mut Counted| -> Result<(), HandlerError> { Ok(()) });
        let guard = ConnectionGuard(Counted { closes: closes.clone() });

        // Never started, so the job stays queued.
        let task = pool.execute(move || handle_connection(&*handler, guard));
        assert_eq!(closes.load(Ordering::SeqCst), 0);

        drop(pool);
        assert!(task.is_complete());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
