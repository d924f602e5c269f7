//! Production Environment implementation using the tokio clock.
//!
//! `tokio::time::Instant` is used instead of `std::time::Instant` so that
//! tests running on a paused runtime (`start_paused = true`) drive the
//! coordinator's timers deterministically.

use std::time::Duration;

use medsession_core::env::Environment;

/// Production environment backed by the tokio clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
