//! Blocking signals shared between threads.
//!
//! [`Signal`] is a manual-reset, set-once event: once set it stays set and
//! every current and future waiter observes it. [`CancellationToken`] builds
//! cooperative cancellation on top of it, with parent/child propagation.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A set-once event that any number of threads can block on.
#[derive(Default)]
pub struct Signal {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    /// Creates an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal and wakes every waiter.
    ///
    /// Returns `true` only for the call that actually flipped the signal.
    pub fn set(&self) -> bool {
        let mut set = self.set.lock();
        if *set {
            return false;
        }
        *set = true;
        self.cond.notify_all();
        true
    }

    /// Returns `true` once the signal has been set.
    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Blocks until the signal is set.
    pub fn wait(&self) {
        let mut set = self.set.lock();
        while !*set {
            self.cond.wait(&mut set);
        }
    }

    /// Blocks until the signal is set or `timeout` elapses.
    ///
    /// Returns whether the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => {
                self.wait();
                true
            }
        }
    }

    /// Blocks until the signal is set or `deadline` passes.
    ///
    /// Returns whether the signal is set.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut set = self.set.lock();
        while !*set {
            if self.cond.wait_until(&mut set, deadline).timed_out() {
                break;
            }
        }
        *set
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("set", &self.is_set()).finish()
    }
}

#[derive(Default)]
struct TokenInner {
    signal: Signal,
    children: Mutex<Vec<Weak<TokenInner>>>,
}

impl TokenInner {
    fn cancel(&self) {
        if !self.signal.set() {
            return;
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Cooperative cancellation flag.
///
/// Clones share the same flag. Cancellation is observed only where code
/// checks [`is_cancelled`](Self::is_cancelled) or blocks on
/// [`wait`](Self::wait); nothing is preempted.
///
/// # Example
///
/// ```rust
/// use harbor_tasks::CancellationToken;
///
/// let parent = CancellationToken::new();
/// let child = parent.child_token();
///
/// parent.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent and callable from any thread.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.signal.is_set()
    }

    /// Blocks until cancellation is requested.
    pub fn wait(&self) {
        self.inner.signal.wait();
    }

    /// Blocks until cancellation is requested or `timeout` elapses.
    ///
    /// Returns whether the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.signal.wait_timeout(timeout)
    }

    /// Creates a token that is cancelled together with this one.
    ///
    /// Cancelling the child does not affect the parent.
    pub fn child_token(&self) -> Self {
        let child = Self::new();
        let mut children = self.inner.children.lock();
        if self.is_cancelled() {
            drop(children);
            child.cancel();
            return child;
        }
        children.retain(|weak| weak.strong_count() > 0);
        children.push(Arc::downgrade(&child.inner));
        child
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
