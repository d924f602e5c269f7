//! Fuzz target for the [`SessionCoordinator`] lifecycle
//!
//! Prevent a stale or duplicated backend answer from reviving or
//! double-expiring a session.
//!
//! # Strategy
//!
//! - Operation sequences: logins, activity, timer ticks, logouts and gateway
//!   give-ups in any order
//! - Backend answers: every refresh answer is fuzzed (ok, expired, network)
//! - Timings: idle timeout, cooldown and probe threshold vary per input
//! - Differential: the coordinator is compared with the reference model after
//!   every operation
//!
//! # Invariants
//!
//! - Coordinator and model agree on every observable field
//! - Expired implies UI frozen and no credential
//! - Active iff authenticated
//! - At most one expiry per login
//! - No idle deadline outside `Active`
//! - NEVER panic on any operation sequence

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use medsession_core::{SessionConfig, SessionPhase};
use medsession_harness::{ModelPhase, ModelSession, Operation, SimSession};

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    idle_minutes: u8,
    cooldown_secs: u8,
    probe_threshold_secs: u8,
    idle_detection: bool,
    seed: u64,
    ops: Vec<Operation>,
}

fuzz_target!(|input: FuzzInput| {
    let config = SessionConfig {
        idle_timeout: Duration::from_secs((u64::from(input.idle_minutes) % 30 + 1) * 60),
        activity_cooldown: Duration::from_secs(u64::from(input.cooldown_secs % 30)),
        probe_skip_threshold: Duration::from_secs(u64::from(input.probe_threshold_secs % 30)),
        idle_detection: input.idle_detection,
        ..SessionConfig::default()
    };

    let mut model = ModelSession::new(config);
    let Ok(mut real) = SimSession::new(config, input.seed) else {
        return;
    };
    let mut logins = 0u32;

    for op in input.ops {
        if op == Operation::Login {
            logins += 1;
        }

        model.apply(op);
        real.apply(op);

        let observed = real.observe();
        assert_eq!(model.observe(), observed, "model diverged after {op:?}");

        if observed.is_expired {
            assert!(observed.is_ui_frozen);
            assert!(!observed.is_authenticated);
            assert!(real.coordinator().access_token().is_none());
        }
        assert_eq!(observed.phase == ModelPhase::Active, observed.is_authenticated);
        assert!(observed.expiries <= logins);

        if real.coordinator().phase() != SessionPhase::Active {
            assert!(real.coordinator().idle_deadline().is_none());
        }
    }
});
