//! Real coordinator driven by model operations.
//!
//! Plays the driver's role synchronously: every action is answered from the
//! operation's scripted reply and its completion is fed back at once, on the
//! virtual clock.

use std::{sync::Arc, time::Duration};

use medsession_core::{
    AccessToken, ActivitySignal, CredentialStore, MemoryStorage, RefreshError, SessionAction,
    SessionConfig, SessionCoordinator, SessionEvent, SessionPhase, StorageKeys,
    DEFAULT_PRESERVED_KEYS,
};

use crate::{
    mock_api::test_user,
    model::{ModelPhase, ObservableState, Operation, RefreshReply},
    sim_env::SimEnv,
};

/// Coordinator wired to [`SimEnv`] and [`MemoryStorage`].
pub type SimCoordinator = SessionCoordinator<SimEnv, Arc<MemoryStorage>>;

/// Coordinator plus the bookkeeping needed to compare it with the model.
pub struct SimSession {
    env: SimEnv,
    storage: Arc<MemoryStorage>,
    coordinator: SimCoordinator,
    expiries: u32,
    logout_calls: u32,
    issued_tokens: u64,
}

impl SimSession {
    /// Anonymous session on a fresh clock and empty storage.
    pub fn new(config: SessionConfig, seed: u64) -> Result<Self, medsession_core::SessionError> {
        let env = SimEnv::with_seed(seed);
        let storage = Arc::new(MemoryStorage::new());
        let preserved = DEFAULT_PRESERVED_KEYS.iter().map(|k| (*k).to_string()).collect();
        let credentials = CredentialStore::load(Arc::clone(&storage), StorageKeys::default(), preserved);
        let coordinator = SessionCoordinator::new(env.clone(), config, credentials)?;

        Ok(Self { env, storage, coordinator, expiries: 0, logout_calls: 0, issued_tokens: 0 })
    }

    /// The clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Backing storage.
    pub fn storage(&self) -> &Arc<MemoryStorage> {
        &self.storage
    }

    /// The coordinator under test.
    pub fn coordinator(&self) -> &SimCoordinator {
        &self.coordinator
    }

    /// State in model terms.
    pub fn observe(&self) -> ObservableState {
        let snapshot = self.coordinator.snapshot();
        ObservableState {
            phase: match snapshot.phase {
                SessionPhase::Anonymous => ModelPhase::Anonymous,
                SessionPhase::Active => ModelPhase::Active,
                SessionPhase::Expired => ModelPhase::Expired,
            },
            is_expired: snapshot.is_expired,
            is_ui_frozen: snapshot.is_ui_frozen,
            is_authenticated: snapshot.is_authenticated,
            expiries: self.expiries,
            logout_calls: self.logout_calls,
        }
    }

    /// Apply one operation; returns every action the coordinator emitted.
    pub fn apply(&mut self, op: Operation) -> Vec<SessionAction> {
        let (event, reply) = match op {
            Operation::Login => {
                let event = SessionEvent::LoggedIn {
                    user: test_user(),
                    access_token: AccessToken::new("tok-login"),
                };
                (event, RefreshReply::Ok)
            },
            Operation::Activity => {
                (SessionEvent::Activity { signal: ActivitySignal::Pointer }, RefreshReply::Ok)
            },
            Operation::AdvanceTime { secs } => {
                self.env.advance(Duration::from_secs(u64::from(secs)));
                return Vec::new();
            },
            Operation::IdleCheck => (SessionEvent::IdleCheck, RefreshReply::Ok),
            Operation::RefreshTick { reply } => (SessionEvent::RefreshDue, reply),
            Operation::ProbeTick { reply } => (SessionEvent::ProbeDue, reply),
            Operation::Logout => (SessionEvent::LogoutRequested, RefreshReply::Ok),
            Operation::GatewayRejected { expired } => {
                let epoch = self.coordinator.epoch();
                (SessionEvent::ForcedLogout { epoch, expired }, RefreshReply::Ok)
            },
        };

        self.run(event, reply)
    }

    fn run(&mut self, event: SessionEvent, reply: RefreshReply) -> Vec<SessionAction> {
        let mut emitted = Vec::new();
        let mut queue = std::collections::VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            // Login with a fixed non-empty token cannot be rejected.
            let Ok(actions) = self.coordinator.handle(event) else {
                continue;
            };

            for action in actions {
                if let Some(completion) = self.complete(&action, reply) {
                    queue.push_back(completion);
                }
                emitted.push(action);
            }
        }

        emitted
    }

    fn complete(&mut self, action: &SessionAction, reply: RefreshReply) -> Option<SessionEvent> {
        match action {
            SessionAction::NotifyActivity { epoch, .. } => {
                Some(SessionEvent::ActivityAcknowledged { epoch: *epoch, result: Ok(()) })
            },
            SessionAction::Refresh { epoch, origin, .. } => {
                let result = match reply {
                    RefreshReply::Ok => {
                        self.issued_tokens += 1;
                        Ok(AccessToken::new(format!("tok-{}", self.issued_tokens)))
                    },
                    RefreshReply::Expired => Err(RefreshError::SessionExpired),
                    RefreshReply::Network => {
                        Err(RefreshError::Network { reason: "simulated".to_string() })
                    },
                };
                Some(SessionEvent::RefreshCompleted { epoch: *epoch, origin: *origin, result })
            },
            SessionAction::CallLogout { epoch, .. } => {
                self.logout_calls += 1;
                Some(SessionEvent::LogoutFinished { epoch: *epoch })
            },
            SessionAction::SessionExpired { .. } => {
                self.expiries += 1;
                None
            },
            SessionAction::SessionCleared => None,
        }
    }
}
