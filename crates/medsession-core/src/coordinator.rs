//! Session Coordinator
//!
//! Composes the activity monitor and the credential store into the session
//! lifecycle state machine.
//!
//! ## States
//!
//! ```text
//!             LoggedIn                IdleCheck (idle) / SessionExpired
//! Anonymous ───────────▶ Active ─────────────────────────────────────▶ Expired
//!     ▲                    │                                              │
//!     └──── LogoutFinished ┘◀──────────── LogoutRequested ────────────────┘
//! ```
//!
//! The proactive refresh loop and the idle-probe loop are concurrent timers
//! layered on `Active`, not sub-states.
//!
//! ## Design
//!
//! - Action-based: `handle` returns actions, the driver performs the I/O and
//!   feeds completions back as events
//! - Epochs: every login/logout bumps the session epoch; completions carrying
//!   an older epoch are ignored, so a late refresh can never resurrect or
//!   overwrite a session
//! - One-shot expiry: [`ExpiryGuard`] is a compare-and-set flag, so expiry runs
//!   once even when several loops observe it back to back

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crate::{
    activity::{ActivityConfig, ActivityEvent, ActivityMonitor, ActivitySignal, ActivityState},
    api::RefreshError,
    config::SessionConfig,
    credential::{AccessToken, Credential, CredentialError, CredentialStore, UserProfile},
    env::{Environment, elapsed},
    error::SessionError,
    storage::DurableStorage,
};

/// Session generation counter.
pub type Epoch = u64;

/// Coarse lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Nobody is logged in.
    #[default]
    Anonymous,
    /// Logged in; timers running.
    Active,
    /// Session ended by idle timeout or backend rejection. The UI is frozen
    /// until the user logs in again.
    Expired,
}

/// Which path asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOrigin {
    /// Periodic proactive refresh loop.
    Proactive,
    /// Idle-probe loop.
    IdleProbe,
    /// Request gateway recovering from a 401.
    Gateway,
}

/// Why a session expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// Client-side idle timeout elapsed.
    IdleTimeout,
    /// Backend answered with a session-expired rejection.
    Rejected(RefreshOrigin),
}

/// Coordinator-owned session flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState<I> {
    /// Session ended; set together with `is_ui_frozen`.
    pub is_expired: bool,
    /// UI must block authenticated interaction.
    pub is_ui_frozen: bool,
    /// Last successful refresh or activity acknowledgment.
    pub last_server_ack_at: Option<I>,
}

impl<I> Default for SessionState<I> {
    fn default() -> Self {
        Self { is_expired: false, is_ui_frozen: false, last_server_ack_at: None }
    }
}

/// Read-only view published to the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Logged-in user.
    pub user: Option<UserProfile>,
    /// Whether a usable credential is present.
    pub is_authenticated: bool,
    /// Session expired.
    pub is_expired: bool,
    /// UI must be blocked.
    pub is_ui_frozen: bool,
}

/// One-shot compare-and-set guard for the expiry transition.
#[derive(Debug, Default)]
pub struct ExpiryGuard(AtomicBool);

impl ExpiryGuard {
    /// Create an untripped guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the guard. Returns true only for the caller that tripped it.
    pub fn try_trip(&self) -> bool {
        self.0.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Whether the guard has been tripped.
    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Re-arm for a new session.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Events fed into the coordinator.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Login succeeded.
    LoggedIn {
        /// Logged-in user.
        user: UserProfile,
        /// Fresh access token.
        access_token: AccessToken,
    },

    /// User or network interaction observed.
    Activity {
        /// Interaction category.
        signal: ActivitySignal,
    },

    /// Idle deadline may have passed.
    IdleCheck,

    /// Proactive refresh loop tick.
    RefreshDue,

    /// Idle-probe loop tick.
    ProbeDue,

    /// Gateway needs a refresh to recover from a 401.
    RefreshRequested {
        /// Requesting path.
        origin: RefreshOrigin,
    },

    /// `notify_activity` finished.
    ActivityAcknowledged {
        /// Epoch the call was issued in.
        epoch: Epoch,
        /// Call outcome.
        result: Result<(), RefreshError>,
    },

    /// `refresh` finished.
    RefreshCompleted {
        /// Epoch the call was issued in.
        epoch: Epoch,
        /// Requesting path.
        origin: RefreshOrigin,
        /// New token or failure.
        result: Result<AccessToken, RefreshError>,
    },

    /// User asked to log out.
    LogoutRequested,

    /// Backend logout call finished (either way).
    LogoutFinished {
        /// Epoch the call was issued in.
        epoch: Epoch,
    },

    /// Gateway gave up on a 401.
    ForcedLogout {
        /// Epoch the failing request was sent in.
        epoch: Epoch,
        /// Whether the backend said the session expired.
        expired: bool,
    },

    /// Driver is stopping; every later event is ignored.
    Shutdown,
}

/// Actions for the driver to execute, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Call `notify_activity`, then feed `ActivityAcknowledged`.
    NotifyActivity {
        /// Current epoch.
        epoch: Epoch,
        /// Token to authenticate with.
        access_token: AccessToken,
    },

    /// Call `refresh`, then feed `RefreshCompleted`.
    Refresh {
        /// Current epoch.
        epoch: Epoch,
        /// Requesting path.
        origin: RefreshOrigin,
        /// Token to authenticate with.
        access_token: AccessToken,
    },

    /// Call `logout` (best effort), then feed `LogoutFinished`.
    CallLogout {
        /// Current epoch.
        epoch: Epoch,
        /// Token to authenticate with.
        access_token: AccessToken,
    },

    /// Session expired; render the blocking screen.
    SessionExpired {
        /// Why.
        reason: ExpiryReason,
    },

    /// Session ended normally; return to the login screen.
    SessionCleared,
}

/// Session lifecycle state machine.
///
/// Pure state machine - returns actions, caller handles I/O.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time
/// - `S`: Durable storage behind the credential store
pub struct SessionCoordinator<E: Environment, S> {
    env: E,
    config: SessionConfig,
    monitor: ActivityMonitor<E::Instant>,
    credentials: CredentialStore<S>,
    state: SessionState<E::Instant>,
    phase: SessionPhase,
    epoch: Epoch,
    guard: ExpiryGuard,
    logout_in_flight: bool,
    stopped: bool,
}

impl<E: Environment, S: DurableStorage> SessionCoordinator<E, S> {
    /// Create a coordinator around a loaded credential store.
    ///
    /// A credential restored from storage resumes `Active` with no server
    /// acknowledgment, so the first probe verifies it with the backend.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` if the configuration is invalid.
    pub fn new(
        env: E,
        config: SessionConfig,
        credentials: CredentialStore<S>,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let mut coordinator = Self {
            env,
            config,
            monitor: ActivityMonitor::new(),
            credentials,
            state: SessionState::default(),
            phase: SessionPhase::Anonymous,
            epoch: 0,
            guard: ExpiryGuard::new(),
            logout_in_flight: false,
            stopped: false,
        };

        if coordinator.credentials.is_authenticated() {
            coordinator.activate(None)?;
            tracing::info!(epoch = coordinator.epoch, "Restored persisted session");
        }

        Ok(coordinator)
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Current session flags.
    pub fn state(&self) -> SessionState<E::Instant> {
        self.state
    }

    /// Current epoch.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Timing configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current credential.
    pub fn credential(&self) -> &Credential {
        self.credentials.credential()
    }

    /// Credential store (read-only).
    pub fn credentials(&self) -> &CredentialStore<S> {
        &self.credentials
    }

    /// Current access token, if any.
    pub fn access_token(&self) -> Option<&str> {
        self.credentials.access_token()
    }

    /// When the driver should next send `IdleCheck`.
    pub fn idle_deadline(&self) -> Option<E::Instant> {
        if self.stopped || self.phase != SessionPhase::Active {
            return None;
        }
        self.monitor.idle_deadline()
    }

    /// Activity monitor view.
    pub fn activity_state(&self) -> ActivityState<E::Instant> {
        self.monitor.state()
    }

    /// Whether `Shutdown` has been processed.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// View for observers.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            user: self.credentials.user().cloned(),
            is_authenticated: self.credentials.is_authenticated(),
            is_expired: self.state.is_expired,
            is_ui_frozen: self.state.is_ui_frozen,
        }
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` only for `LoggedIn` with an unusable
    /// credential. Every other event degrades to logging.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>, SessionError> {
        if self.stopped {
            return Ok(vec![]);
        }

        match event {
            SessionEvent::LoggedIn { user, access_token } => self.handle_login(user, access_token),
            SessionEvent::Activity { signal } => Ok(self.handle_activity(signal)),
            SessionEvent::IdleCheck => Ok(self.handle_idle_check()),
            SessionEvent::RefreshDue => Ok(self.handle_refresh_due()),
            SessionEvent::ProbeDue => Ok(self.handle_probe_due()),
            SessionEvent::RefreshRequested { origin } => Ok(self.refresh_action(origin).into_iter().collect()),
            SessionEvent::ActivityAcknowledged { epoch, result } => {
                Ok(self.handle_activity_ack(epoch, result))
            },
            SessionEvent::RefreshCompleted { epoch, origin, result } => {
                Ok(self.handle_refresh_completed(epoch, origin, result))
            },
            SessionEvent::LogoutRequested => Ok(self.handle_logout_requested()),
            SessionEvent::LogoutFinished { epoch } => Ok(self.handle_logout_finished(epoch)),
            SessionEvent::ForcedLogout { epoch, expired } => {
                Ok(self.handle_forced_logout(epoch, expired))
            },
            SessionEvent::Shutdown => {
                self.monitor.stop();
                self.stopped = true;
                tracing::debug!(epoch = self.epoch, "Coordinator stopped");
                Ok(vec![])
            },
        }
    }

    fn handle_login(
        &mut self,
        user: UserProfile,
        access_token: AccessToken,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match self.credentials.set_credential(user, access_token.into_inner()) {
            Ok(()) => {},
            Err(CredentialError::Storage(e)) => {
                tracing::warn!(error = %e, "Login credential not persisted");
            },
            Err(e) => return Err(e.into()),
        }

        let now = self.env.now();
        self.activate(Some(now))?;
        tracing::info!(
            epoch = self.epoch,
            user_id = self.credentials.user().map(|u| u.id),
            "Session started"
        );

        Ok(vec![])
    }

    /// Enter `Active` with a fresh epoch, guard and monitor.
    fn activate(&mut self, acknowledged_at: Option<E::Instant>) -> Result<(), SessionError> {
        let now = self.env.now();

        self.epoch += 1;
        self.guard.reset();
        self.logout_in_flight = false;
        self.state = SessionState {
            is_expired: false,
            is_ui_frozen: false,
            last_server_ack_at: acknowledged_at,
        };
        self.phase = SessionPhase::Active;
        self.monitor.start(self.activity_config(), now)?;

        Ok(())
    }

    fn activity_config(&self) -> ActivityConfig {
        ActivityConfig {
            idle_timeout: self.config.idle_timeout,
            notify_cooldown: self.config.activity_cooldown,
            enabled: self.config.idle_detection,
        }
    }

    /// Token to call the backend with, if calls are currently allowed.
    fn callable_token(&self) -> Option<AccessToken> {
        if self.phase != SessionPhase::Active || self.logout_in_flight {
            return None;
        }
        self.credentials.access_token().map(AccessToken::from)
    }

    fn refresh_action(&self, origin: RefreshOrigin) -> Option<SessionAction> {
        let access_token = self.callable_token()?;
        Some(SessionAction::Refresh { epoch: self.epoch, origin, access_token })
    }

    fn handle_activity(&mut self, signal: ActivitySignal) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Active {
            return vec![];
        }

        let now = self.env.now();
        match self.monitor.record(signal, now) {
            Some(ActivityEvent::Active) => self
                .callable_token()
                .map(|access_token| SessionAction::NotifyActivity { epoch: self.epoch, access_token })
                .into_iter()
                .collect(),
            _ => vec![],
        }
    }

    fn handle_idle_check(&mut self) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Active {
            return vec![];
        }

        let now = self.env.now();
        match self.monitor.poll_idle(now) {
            Some(ActivityEvent::Idle) => self.expire(ExpiryReason::IdleTimeout),
            _ => vec![],
        }
    }

    /// Notify first, then refresh: recent activity must reach the backend
    /// before it is asked to extend the session.
    fn handle_refresh_due(&mut self) -> Vec<SessionAction> {
        let Some(access_token) = self.callable_token() else {
            return vec![];
        };

        vec![
            SessionAction::NotifyActivity { epoch: self.epoch, access_token: access_token.clone() },
            SessionAction::Refresh { epoch: self.epoch, origin: RefreshOrigin::Proactive, access_token },
        ]
    }

    fn handle_probe_due(&mut self) -> Vec<SessionAction> {
        if let Some(acked_at) = self.state.last_server_ack_at {
            let since_ack = elapsed(self.env.now(), acked_at);
            if since_ack < self.config.probe_skip_threshold {
                tracing::trace!(?since_ack, "Idle probe skipped");
                return vec![];
            }
        }

        self.refresh_action(RefreshOrigin::IdleProbe).into_iter().collect()
    }

    fn handle_activity_ack(
        &mut self,
        epoch: Epoch,
        result: Result<(), RefreshError>,
    ) -> Vec<SessionAction> {
        if !self.is_current(epoch) {
            return vec![];
        }

        match result {
            Ok(()) => self.acknowledge(),
            // Best effort: even an expiry answer here is left to the probe.
            Err(e) => tracing::debug!(error = %e, "Activity notification failed"),
        }

        vec![]
    }

    fn handle_refresh_completed(
        &mut self,
        epoch: Epoch,
        origin: RefreshOrigin,
        result: Result<AccessToken, RefreshError>,
    ) -> Vec<SessionAction> {
        if !self.is_current(epoch) {
            tracing::debug!(epoch, current = self.epoch, ?origin, "Stale refresh result ignored");
            return vec![];
        }

        match result {
            Ok(token) => {
                match self.credentials.update_token(token.into_inner()) {
                    Ok(changed) => {
                        tracing::debug!(?origin, changed, "Access token refreshed");
                        self.acknowledge();
                    },
                    Err(CredentialError::Storage(e)) => {
                        tracing::warn!(error = %e, "Refreshed token not persisted");
                        self.acknowledge();
                    },
                    Err(e) => tracing::warn!(error = %e, ?origin, "Refresh returned unusable token"),
                }
                vec![]
            },
            Err(RefreshError::SessionExpired) => self.expire(ExpiryReason::Rejected(origin)),
            Err(e) => {
                tracing::warn!(error = %e, ?origin, "Refresh failed, retrying next tick");
                vec![]
            },
        }
    }

    fn handle_logout_requested(&mut self) -> Vec<SessionAction> {
        match self.phase {
            SessionPhase::Anonymous => vec![],
            SessionPhase::Expired => {
                // Credential is already gone; only the frozen flags remain.
                self.reset_to_anonymous();
                vec![SessionAction::SessionCleared]
            },
            SessionPhase::Active if self.logout_in_flight => vec![],
            SessionPhase::Active => match self.credentials.access_token() {
                Some(token) => {
                    let access_token = AccessToken::from(token);
                    self.logout_in_flight = true;
                    tracing::info!(epoch = self.epoch, "Logout requested");
                    vec![SessionAction::CallLogout { epoch: self.epoch, access_token }]
                },
                None => {
                    self.reset_to_anonymous();
                    vec![SessionAction::SessionCleared]
                },
            },
        }
    }

    fn handle_logout_finished(&mut self, epoch: Epoch) -> Vec<SessionAction> {
        if epoch != self.epoch || !self.logout_in_flight {
            return vec![];
        }

        self.reset_to_anonymous();
        vec![SessionAction::SessionCleared]
    }

    fn handle_forced_logout(&mut self, epoch: Epoch, expired: bool) -> Vec<SessionAction> {
        if !self.is_current(epoch) {
            return vec![];
        }

        if expired {
            return self.expire(ExpiryReason::Rejected(RefreshOrigin::Gateway));
        }

        tracing::info!(epoch = self.epoch, "Forced logout after unrecoverable 401");
        self.reset_to_anonymous();
        vec![SessionAction::SessionCleared]
    }

    /// Whether a completion belongs to the live session.
    fn is_current(&self, epoch: Epoch) -> bool {
        epoch == self.epoch && self.phase == SessionPhase::Active
    }

    fn acknowledge(&mut self) {
        self.state.last_server_ack_at = Some(self.env.now());
    }

    /// Transition to `Expired`, at most once per session.
    fn expire(&mut self, reason: ExpiryReason) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Active || !self.guard.try_trip() {
            return vec![];
        }

        self.monitor.stop();
        if let Err(e) = self.credentials.clear_credential() {
            tracing::warn!(error = %e, "Credential storage not cleared on expiry");
        }

        self.state.is_expired = true;
        self.state.is_ui_frozen = true;
        self.phase = SessionPhase::Expired;
        self.logout_in_flight = false;

        tracing::info!(epoch = self.epoch, ?reason, "Session expired");
        vec![SessionAction::SessionExpired { reason }]
    }

    fn reset_to_anonymous(&mut self) {
        self.monitor.stop();
        if self.credentials.is_authenticated() {
            if let Err(e) = self.credentials.clear_credential() {
                tracing::warn!(error = %e, "Credential storage not cleared on logout");
            }
        }

        self.epoch += 1;
        self.state = SessionState::default();
        self.phase = SessionPhase::Anonymous;
        self.logout_in_flight = false;

        tracing::info!(epoch = self.epoch, "Session cleared");
    }

    /// Duration until the next idle deadline, if one is armed.
    pub fn time_to_idle(&self) -> Option<Duration> {
        self.idle_deadline().map(|deadline| elapsed(deadline, self.env.now()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{
        future::Future,
        sync::{Arc, Mutex},
        time::Instant,
    };

    use proptest::prelude::*;

    use super::*;
    use crate::{
        credential::{DEFAULT_PRESERVED_KEYS, StorageKeys},
        role::Role,
        storage::MemoryStorage,
    };

    /// Manually advanced clock.
    #[derive(Clone)]
    struct TestEnv {
        base: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { base: Instant::now(), offset: Arc::new(Mutex::new(Duration::ZERO)) }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Self::Instant {
            self.base + *self.offset.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            self.advance(duration);
            std::future::ready(())
        }
    }

    type Coordinator = SessionCoordinator<TestEnv, Arc<MemoryStorage>>;

    fn user() -> UserProfile {
        UserProfile {
            id: 1,
            name: "Dr. Iyer".to_string(),
            email: "iyer@example.org".to_string(),
            role: Role::Faculty,
        }
    }

    fn coordinator_with(storage: Arc<MemoryStorage>) -> (TestEnv, Coordinator) {
        let env = TestEnv::new();
        let preserved = DEFAULT_PRESERVED_KEYS.iter().map(|k| (*k).to_string()).collect();
        let store = CredentialStore::load(storage, StorageKeys::default(), preserved);
        let coordinator = SessionCoordinator::new(env.clone(), SessionConfig::default(), store).unwrap();
        (env, coordinator)
    }

    fn logged_in() -> (TestEnv, Arc<MemoryStorage>, Coordinator) {
        let storage = Arc::new(MemoryStorage::new());
        let (env, mut coordinator) = coordinator_with(Arc::clone(&storage));
        coordinator
            .handle(SessionEvent::LoggedIn { user: user(), access_token: "tok-1".into() })
            .unwrap();
        (env, storage, coordinator)
    }

    fn refreshed(epoch: Epoch, origin: RefreshOrigin, token: &str) -> SessionEvent {
        SessionEvent::RefreshCompleted { epoch, origin, result: Ok(token.into()) }
    }

    fn rejected(epoch: Epoch, origin: RefreshOrigin) -> SessionEvent {
        SessionEvent::RefreshCompleted { epoch, origin, result: Err(RefreshError::SessionExpired) }
    }

    #[test]
    fn starts_anonymous() {
        let (_, coordinator) = coordinator_with(Arc::new(MemoryStorage::new()));
        assert_eq!(coordinator.phase(), SessionPhase::Anonymous);
        assert_eq!(coordinator.idle_deadline(), None);
    }

    #[test]
    fn login_activates() {
        let (_, _, coordinator) = logged_in();
        let snapshot = coordinator.snapshot();

        assert_eq!(snapshot.phase, SessionPhase::Active);
        assert!(snapshot.is_authenticated);
        assert!(!snapshot.is_expired);
        assert_eq!(coordinator.access_token(), Some("tok-1"));
        assert!(coordinator.state().last_server_ack_at.is_some());
    }

    #[test]
    fn login_with_empty_token_rejected() {
        let (_, mut coordinator) = coordinator_with(Arc::new(MemoryStorage::new()));
        let result =
            coordinator.handle(SessionEvent::LoggedIn { user: user(), access_token: "".into() });

        assert!(matches!(result, Err(SessionError::Credential(CredentialError::EmptyToken))));
        assert_eq!(coordinator.phase(), SessionPhase::Anonymous);
    }

    #[test]
    fn restored_session_probes_immediately() {
        let storage = Arc::new(MemoryStorage::new());
        logged_in_into(&storage);

        let (_, mut coordinator) = coordinator_with(storage);
        assert_eq!(coordinator.phase(), SessionPhase::Active);

        let actions = coordinator.handle(SessionEvent::ProbeDue).unwrap();
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Refresh { origin: RefreshOrigin::IdleProbe, .. }]
        ));
    }

    fn logged_in_into(storage: &Arc<MemoryStorage>) {
        let (_, mut coordinator) = coordinator_with(Arc::clone(storage));
        coordinator
            .handle(SessionEvent::LoggedIn { user: user(), access_token: "tok-1".into() })
            .unwrap();
    }

    #[test]
    fn idle_timeout_expires_session() {
        let (env, storage, mut coordinator) = logged_in();
        env.advance(Duration::from_secs(15 * 60));

        let actions = coordinator.handle(SessionEvent::IdleCheck).unwrap();

        assert_eq!(
            actions,
            vec![SessionAction::SessionExpired { reason: ExpiryReason::IdleTimeout }]
        );
        let snapshot = coordinator.snapshot();
        assert!(snapshot.is_expired && snapshot.is_ui_frozen);
        assert!(!snapshot.is_authenticated);
        assert_eq!(storage.get("access_token").unwrap(), None);
        assert_eq!(coordinator.idle_deadline(), None);
    }

    #[test]
    fn activity_postpones_idle() {
        let (env, _, mut coordinator) = logged_in();
        env.advance(Duration::from_secs(14 * 60));
        coordinator.handle(SessionEvent::Activity { signal: ActivitySignal::Keyboard }).unwrap();
        env.advance(Duration::from_secs(2 * 60));

        assert!(coordinator.handle(SessionEvent::IdleCheck).unwrap().is_empty());
        assert_eq!(coordinator.phase(), SessionPhase::Active);
    }

    #[test]
    fn activity_notifies_with_throttle() {
        let (env, _, mut coordinator) = logged_in();
        let epoch = coordinator.epoch();

        let first = coordinator.handle(SessionEvent::Activity { signal: ActivitySignal::Pointer }).unwrap();
        env.advance(Duration::from_secs(1));
        let second = coordinator.handle(SessionEvent::Activity { signal: ActivitySignal::Pointer }).unwrap();

        assert_eq!(
            first,
            vec![SessionAction::NotifyActivity { epoch, access_token: "tok-1".into() }]
        );
        assert!(second.is_empty());
    }

    #[test]
    fn proactive_refresh_notifies_before_refreshing() {
        let (_, _, mut coordinator) = logged_in();
        let actions = coordinator.handle(SessionEvent::RefreshDue).unwrap();

        assert!(matches!(
            actions.as_slice(),
            [
                SessionAction::NotifyActivity { .. },
                SessionAction::Refresh { origin: RefreshOrigin::Proactive, .. }
            ]
        ));
    }

    #[test]
    fn refresh_success_updates_token_and_ack() {
        let (env, _, mut coordinator) = logged_in();
        let epoch = coordinator.epoch();
        env.advance(Duration::from_secs(60));

        coordinator.handle(refreshed(epoch, RefreshOrigin::Proactive, "tok-2")).unwrap();

        assert_eq!(coordinator.access_token(), Some("tok-2"));
        assert_eq!(coordinator.state().last_server_ack_at, Some(env.now()));
    }

    #[test]
    fn transient_refresh_failure_keeps_state() {
        let (_, _, mut coordinator) = logged_in();
        let epoch = coordinator.epoch();

        let actions = coordinator
            .handle(SessionEvent::RefreshCompleted {
                epoch,
                origin: RefreshOrigin::Proactive,
                result: Err(RefreshError::Network { reason: "timeout".to_string() }),
            })
            .unwrap();

        assert!(actions.is_empty());
        assert_eq!(coordinator.phase(), SessionPhase::Active);
        assert_eq!(coordinator.access_token(), Some("tok-1"));
    }

    #[test]
    fn probe_skipped_within_threshold() {
        let (env, _, mut coordinator) = logged_in();

        env.advance(Duration::from_secs(7));
        assert!(coordinator.handle(SessionEvent::ProbeDue).unwrap().is_empty());

        env.advance(Duration::from_secs(1));
        let actions = coordinator.handle(SessionEvent::ProbeDue).unwrap();
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Refresh { origin: RefreshOrigin::IdleProbe, .. }]
        ));
    }

    #[test]
    fn double_expiry_transitions_once() {
        let (_, storage, mut coordinator) = logged_in();
        let epoch = coordinator.epoch();
        let clears_before = storage.clears();

        let proactive = coordinator.handle(SessionEvent::RefreshDue).unwrap();
        let probe = coordinator.handle(SessionEvent::ProbeDue).unwrap();
        assert_eq!(proactive.len(), 2);
        // Login counts as an acknowledgment, so the probe is skipped here;
        // the gateway supplies the second concurrent refresh instead.
        assert!(probe.is_empty());

        let first = coordinator.handle(rejected(epoch, RefreshOrigin::Proactive)).unwrap();
        let second = coordinator.handle(rejected(epoch, RefreshOrigin::Gateway)).unwrap();
        let forced = coordinator.handle(SessionEvent::ForcedLogout { epoch, expired: true }).unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(forced.is_empty());
        assert_eq!(storage.clears() - clears_before, 1);
    }

    #[test]
    fn refresh_after_expiry_cannot_revive() {
        let (_, _, mut coordinator) = logged_in();
        let epoch = coordinator.epoch();

        coordinator.handle(rejected(epoch, RefreshOrigin::IdleProbe)).unwrap();
        coordinator.handle(refreshed(epoch, RefreshOrigin::Proactive, "tok-9")).unwrap();

        assert_eq!(coordinator.phase(), SessionPhase::Expired);
        assert!(coordinator.state().is_expired);
        assert_eq!(coordinator.access_token(), None);
    }

    #[test]
    fn login_after_expiry_clears_flags() {
        let (_, _, mut coordinator) = logged_in();
        let epoch = coordinator.epoch();
        coordinator.handle(rejected(epoch, RefreshOrigin::IdleProbe)).unwrap();

        coordinator
            .handle(SessionEvent::LoggedIn { user: user(), access_token: "tok-2".into() })
            .unwrap();

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Active);
        assert!(!snapshot.is_expired && !snapshot.is_ui_frozen);
        assert!(coordinator.epoch() > epoch);
    }

    #[test]
    fn logout_calls_backend_once_then_clears() {
        let (_, storage, mut coordinator) = logged_in();
        let epoch = coordinator.epoch();

        let first = coordinator.handle(SessionEvent::LogoutRequested).unwrap();
        let second = coordinator.handle(SessionEvent::LogoutRequested).unwrap();
        assert_eq!(first, vec![SessionAction::CallLogout { epoch, access_token: "tok-1".into() }]);
        assert!(second.is_empty());

        // Loops stay quiet while the logout is in flight.
        assert!(coordinator.handle(SessionEvent::RefreshDue).unwrap().is_empty());

        let done = coordinator.handle(SessionEvent::LogoutFinished { epoch }).unwrap();
        assert_eq!(done, vec![SessionAction::SessionCleared]);
        assert_eq!(coordinator.phase(), SessionPhase::Anonymous);
        assert_eq!(storage.get("user").unwrap(), None);
    }

    #[test]
    fn logout_from_expired_resets_flags() {
        let (_, _, mut coordinator) = logged_in();
        let epoch = coordinator.epoch();
        coordinator.handle(rejected(epoch, RefreshOrigin::IdleProbe)).unwrap();

        let actions = coordinator.handle(SessionEvent::LogoutRequested).unwrap();

        assert_eq!(actions, vec![SessionAction::SessionCleared]);
        assert_eq!(coordinator.snapshot(), SessionSnapshot::default());
    }

    #[test]
    fn stale_refresh_after_relogin_ignored() {
        let (_, _, mut coordinator) = logged_in();
        let old_epoch = coordinator.epoch();

        coordinator.handle(SessionEvent::LogoutRequested).unwrap();
        coordinator.handle(SessionEvent::LogoutFinished { epoch: old_epoch }).unwrap();
        coordinator
            .handle(SessionEvent::LoggedIn { user: user(), access_token: "tok-new".into() })
            .unwrap();

        coordinator.handle(rejected(old_epoch, RefreshOrigin::Proactive)).unwrap();
        coordinator.handle(refreshed(old_epoch, RefreshOrigin::Proactive, "tok-old")).unwrap();

        assert_eq!(coordinator.phase(), SessionPhase::Active);
        assert_eq!(coordinator.access_token(), Some("tok-new"));
    }

    #[test]
    fn forced_logout_without_expiry_clears() {
        let (_, _, mut coordinator) = logged_in();
        let epoch = coordinator.epoch();

        let actions =
            coordinator.handle(SessionEvent::ForcedLogout { epoch, expired: false }).unwrap();

        assert_eq!(actions, vec![SessionAction::SessionCleared]);
        assert!(!coordinator.snapshot().is_expired);
        assert_eq!(coordinator.phase(), SessionPhase::Anonymous);
    }

    #[test]
    fn shutdown_silences_everything() {
        let (env, _, mut coordinator) = logged_in();
        coordinator.handle(SessionEvent::Shutdown).unwrap();
        env.advance(Duration::from_secs(3600));

        assert!(coordinator.handle(SessionEvent::IdleCheck).unwrap().is_empty());
        assert!(coordinator.handle(SessionEvent::RefreshDue).unwrap().is_empty());
        assert_eq!(coordinator.idle_deadline(), None);
        assert!(coordinator.is_stopped());
    }

    #[test]
    fn expiry_guard_trips_once() {
        let guard = ExpiryGuard::new();
        assert!(guard.try_trip());
        assert!(!guard.try_trip());
        guard.reset();
        assert!(guard.try_trip());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Advance(u16),
        Activity,
        IdleCheck,
        RefreshOk,
        RefreshExpired,
        RefreshNetwork,
        Probe,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u16..u16::MAX).prop_map(Step::Advance),
            Just(Step::Activity),
            Just(Step::IdleCheck),
            Just(Step::RefreshOk),
            Just(Step::RefreshExpired),
            Just(Step::RefreshNetwork),
            Just(Step::Probe),
        ]
    }

    proptest! {
        #[test]
        fn prop_expired_never_reverts_without_login(steps in prop::collection::vec(step(), 1..80)) {
            let (env, _, mut coordinator) = logged_in();
            let epoch = coordinator.epoch();
            let mut was_expired = false;

            for step in steps {
                let event = match step {
                    Step::Advance(secs) => {
                        env.advance(Duration::from_secs(u64::from(secs)));
                        continue;
                    },
                    Step::Activity => SessionEvent::Activity { signal: ActivitySignal::Pointer },
                    Step::IdleCheck => SessionEvent::IdleCheck,
                    Step::RefreshOk => refreshed(epoch, RefreshOrigin::Proactive, "tok-x"),
                    Step::RefreshExpired => rejected(epoch, RefreshOrigin::IdleProbe),
                    Step::RefreshNetwork => SessionEvent::RefreshCompleted {
                        epoch,
                        origin: RefreshOrigin::Proactive,
                        result: Err(RefreshError::Network { reason: "down".to_string() }),
                    },
                    Step::Probe => SessionEvent::ProbeDue,
                };

                let actions = coordinator.handle(event).unwrap();
                let expiries = actions
                    .iter()
                    .filter(|a| matches!(a, SessionAction::SessionExpired { .. }))
                    .count();

                if was_expired {
                    prop_assert_eq!(expiries, 0);
                    prop_assert!(coordinator.state().is_expired);
                    prop_assert!(!coordinator.credential().is_authenticated());
                }
                was_expired = coordinator.state().is_expired;
                prop_assert_eq!(coordinator.state().is_expired, coordinator.state().is_ui_frozen);
            }
        }
    }
}
