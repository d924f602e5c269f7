//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples session logic from the system clock.
//! Every timer in the coordinator (idle deadline, refresh cadence, probe skip
//! window) is computed from `now()`, so:
//!
//! - Deterministic Simulation: a virtual clock can be advanced explicitly and
//!   idle/expiry scenarios replay identically.
//!
//! - Production Runtime: the tokio clock drives the same logic without any
//!   code changes.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Isolation: Implementations must not share global state

use std::{
    fmt::Debug,
    ops::{Add, Sub},
    time::Duration,
};

/// Abstract environment providing time and sleeping.
///
/// # Safety
///
/// Implementations MUST guarantee time monotonicity: `now()` never goes
/// backwards within a single execution context.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Point-in-time type produced by this environment.
    type Instant: Copy
        + Ord
        + Debug
        + Send
        + Sync
        + 'static
        + Add<Duration, Output = Self::Instant>
        + Sub<Self::Instant, Output = Duration>;

    /// Returns the current time.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; the coordinator itself never sleeps.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Time elapsed from `earlier` to `now`, saturating at zero.
///
/// Instants handed back by the driver can be slightly out of order relative
/// to a freshly read clock, and `Sub` on some instant types panics on
/// underflow.
pub fn elapsed<I>(now: I, earlier: I) -> Duration
where
    I: Copy + Ord + Sub<I, Output = Duration>,
{
    if now > earlier { now - earlier } else { Duration::ZERO }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn elapsed_saturates_when_out_of_order() {
        let t1 = Instant::now();
        let t2 = t1 + Duration::from_millis(5);

        assert_eq!(elapsed(t2, t1), Duration::from_millis(5));
        assert_eq!(elapsed(t1, t2), Duration::ZERO);
    }
}
