//! Listener restart policy.
//!
//! When binding the listener fails the supervisor waits before retrying.
//! The delay for consecutive failure `n` (0-indexed) is `first × factor^n`,
//! clamped to `max`. After `degraded_after` consecutive failures the
//! supervisor reports itself degraded but keeps retrying at the capped delay.
//!
//! # Example
//! ```rust
//! use harbor_server::RestartPolicy;
//! use std::time::Duration;
//!
//! let policy = RestartPolicy::default();
//!
//! assert_eq!(policy.delay(0), Duration::from_millis(100));
//! assert_eq!(policy.delay(1), Duration::from_millis(200));
//! assert_eq!(policy.delay(20), Duration::from_secs(30));
//! assert!(policy.is_degraded(5));
//! ```

use std::time::Duration;

/// Default delay before the first retry.
pub const DEFAULT_RESTART_FIRST: Duration = Duration::from_millis(100);

/// Default delay cap.
pub const DEFAULT_RESTART_MAX: Duration = Duration::from_secs(30);

/// Default growth factor.
pub const DEFAULT_RESTART_FACTOR: f64 = 2.0;

/// Default number of consecutive failures before reporting degraded.
pub const DEFAULT_DEGRADED_AFTER: u32 = 5;

/// Backoff applied between listener bind attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestartPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Maximum delay.
    pub max: Duration,
    /// Multiplicative growth per consecutive failure.
    pub factor: f64,
    /// Consecutive failures after which the supervisor is degraded.
    pub degraded_after: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            first: DEFAULT_RESTART_FIRST,
            max: DEFAULT_RESTART_MAX,
            factor: DEFAULT_RESTART_FACTOR,
            degraded_after: DEFAULT_DEGRADED_AFTER,
        }
    }
}

impl RestartPolicy {
    /// A policy that waits `delay` between every attempt.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            ..Self::default()
        }
    }

    /// Delay to wait after `attempt` consecutive failures (0-indexed).
    ///
    /// Non-finite or negative intermediate values fall back to `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let nanos = self.first.as_nanos() as f64 * self.factor.powi(exp);
        let max_nanos = self.max.as_nanos() as f64;

        if !nanos.is_finite() || nanos < 0.0 || nanos >= max_nanos {
            self.max
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// Whether `failures` consecutive bind failures count as degraded.
    pub fn is_degraded(&self, failures: u32) -> bool {
        failures >= self.degraded_after
    }
}
