//! Virtual-clock [`Environment`].
//!
//! Time only moves when a test says so: [`SimEnv::advance`] or an awaited
//! [`Environment::sleep`], which advances the clock and completes at once.
//! Clones share one clock, so the coordinator and the test see the same
//! time.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use medsession_core::Environment;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Point in virtual time, measured from the simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the simulation started.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Deterministic environment with a shared virtual clock.
#[derive(Debug, Clone)]
pub struct SimEnv {
    clock: Arc<Mutex<Duration>>,
    seed: u64,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Start at time zero with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Start at time zero with a specific seed.
    pub fn with_seed(seed: u64) -> Self {
        Self { clock: Arc::new(Mutex::new(Duration::ZERO)), seed }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    /// Seeded RNG for generated scripts.
    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }

    /// Seed this environment was built with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(*self.clock.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }
}
