//! Reference session model.
//!
//! Tracks time in whole seconds and resolves every backend call instantly.
//! No epochs, no guards, no storage: just the lifecycle rules.

use std::time::Duration;

use medsession_core::SessionConfig;

use super::operation::{ModelPhase, ObservableState, Operation, RefreshReply};

/// Reference implementation of the session lifecycle.
#[derive(Debug, Clone)]
pub struct ModelSession {
    config: SessionConfig,
    now: Duration,
    state: ObservableState,
    last_activity: Duration,
    last_notified: Option<Duration>,
    last_ack: Option<Duration>,
}

impl ModelSession {
    /// Anonymous session at time zero.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            now: Duration::ZERO,
            state: ObservableState::default(),
            last_activity: Duration::ZERO,
            last_notified: None,
            last_ack: None,
        }
    }

    /// Current observable state.
    pub fn observe(&self) -> ObservableState {
        self.state
    }

    /// Apply one operation.
    pub fn apply(&mut self, op: Operation) {
        let active = self.state.phase == ModelPhase::Active;

        match op {
            Operation::Login => {
                self.state.phase = ModelPhase::Active;
                self.state.is_expired = false;
                self.state.is_ui_frozen = false;
                self.state.is_authenticated = true;
                self.last_activity = self.now;
                self.last_notified = None;
                self.last_ack = Some(self.now);
            },

            Operation::Activity if active && self.config.idle_detection => {
                self.last_activity = self.now;
                let cooled = self
                    .last_notified
                    .is_none_or(|at| self.now - at >= self.config.activity_cooldown);
                if cooled {
                    self.last_notified = Some(self.now);
                    self.last_ack = Some(self.now);
                }
            },

            Operation::AdvanceTime { secs } => self.now += Duration::from_secs(u64::from(secs)),

            Operation::IdleCheck
                if active
                    && self.config.idle_detection
                    && self.now - self.last_activity >= self.config.idle_timeout =>
            {
                self.expire();
            },

            Operation::RefreshTick { reply } if active => {
                self.last_ack = Some(self.now);
                self.refresh(reply);
            },

            Operation::ProbeTick { reply } if active => {
                let skip = self
                    .last_ack
                    .is_some_and(|at| self.now - at < self.config.probe_skip_threshold);
                if !skip {
                    self.refresh(reply);
                }
            },

            Operation::Logout => match self.state.phase {
                ModelPhase::Anonymous => {},
                ModelPhase::Active => {
                    self.state.logout_calls += 1;
                    self.clear();
                },
                ModelPhase::Expired => self.clear(),
            },

            Operation::GatewayRejected { expired } if active => {
                if expired {
                    self.expire();
                } else {
                    self.clear();
                }
            },

            _ => {},
        }
    }

    fn refresh(&mut self, reply: RefreshReply) {
        match reply {
            RefreshReply::Ok => self.last_ack = Some(self.now),
            RefreshReply::Expired => self.expire(),
            RefreshReply::Network => {},
        }
    }

    fn expire(&mut self) {
        self.state.phase = ModelPhase::Expired;
        self.state.is_expired = true;
        self.state.is_ui_frozen = true;
        self.state.is_authenticated = false;
        self.state.expiries += 1;
    }

    fn clear(&mut self) {
        self.state = ObservableState {
            expiries: self.state.expiries,
            logout_calls: self.state.logout_calls,
            ..ObservableState::default()
        };
        self.last_ack = None;
        self.last_notified = None;
    }
}
