//! Seeded operation scripts.
//!
//! Produces realistic clinic-shift sequences: bursts of interaction, quiet
//! stretches shorter than the idle timeout, the occasional long absence,
//! and timer ticks at their configured cadence. The same seed always yields
//! the same script.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::model::{Operation, RefreshReply};

/// Generator of seeded operation scripts.
pub struct ActivityScript {
    rng: ChaCha8Rng,
    backend_failure_rate: f64,
}

impl ActivityScript {
    /// Script driven by `rng` with a healthy backend.
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self { rng, backend_failure_rate: 0.0 }
    }

    /// Fraction of refreshes answered with a network error or expiry.
    pub fn with_backend_failures(mut self, rate: f64) -> Self {
        self.backend_failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Generate `len` operations, always starting with a login.
    pub fn operations(&mut self, len: usize) -> Vec<Operation> {
        let mut ops = Vec::with_capacity(len);
        ops.push(Operation::Login);

        while ops.len() < len {
            let op = match self.rng.gen_range(0..100) {
                0..=39 => Operation::Activity,
                40..=59 => Operation::AdvanceTime { secs: self.rng.gen_range(1..=12) },
                60..=64 => Operation::AdvanceTime { secs: self.rng.gen_range(60..=1200) },
                65..=74 => Operation::IdleCheck,
                75..=84 => Operation::ProbeTick { reply: self.reply() },
                85..=92 => Operation::RefreshTick { reply: self.reply() },
                93..=95 => Operation::GatewayRejected { expired: self.rng.gen_bool(0.5) },
                96..=97 => Operation::Logout,
                _ => Operation::Login,
            };
            ops.push(op);
        }

        ops
    }

    fn reply(&mut self) -> RefreshReply {
        if !self.rng.gen_bool(self.backend_failure_rate) {
            return RefreshReply::Ok;
        }
        if self.rng.gen_bool(0.5) { RefreshReply::Network } else { RefreshReply::Expired }
    }
}
