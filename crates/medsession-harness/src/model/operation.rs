//! Operations for model-based testing.
//!
//! Operations cover everything that can happen to a session: user input,
//! timer ticks with a scripted backend answer, logout, gateway give-ups and
//! the passage of time. They are generated by proptest, by seeded scripts,
//! and by the fuzzer, and applied to both the model and the coordinator.

use arbitrary::Arbitrary;

/// Scripted backend answer to a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum RefreshReply {
    /// New token issued.
    Ok,
    /// Backend reports the session expired.
    Expired,
    /// Transport failed.
    Network,
}

/// Operations that can be applied to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Successful login.
    Login,

    /// User interaction.
    Activity,

    /// Advance time.
    AdvanceTime {
        /// Seconds to advance.
        secs: u16,
    },

    /// Idle watcher wakes up.
    IdleCheck,

    /// Proactive loop tick; activity notification succeeds.
    RefreshTick {
        /// Refresh answer.
        reply: RefreshReply,
    },

    /// Idle-probe tick.
    ProbeTick {
        /// Refresh answer, if the probe is not skipped.
        reply: RefreshReply,
    },

    /// User logs out; backend logout succeeds.
    Logout,

    /// Gateway gave up on a 401.
    GatewayRejected {
        /// Payload said the session expired.
        expired: bool,
    },
}

/// Coarse phase, comparable across model and coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelPhase {
    /// No session.
    #[default]
    Anonymous,
    /// Session live.
    Active,
    /// Session expired; UI frozen.
    Expired,
}

/// State compared after every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObservableState {
    /// Phase.
    pub phase: ModelPhase,
    /// Expired flag.
    pub is_expired: bool,
    /// UI frozen flag.
    pub is_ui_frozen: bool,
    /// Credential present.
    pub is_authenticated: bool,
    /// Number of expiry transitions so far.
    pub expiries: u32,
    /// Number of backend logout calls so far.
    pub logout_calls: u32,
}
