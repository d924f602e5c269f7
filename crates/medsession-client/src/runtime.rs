//! Tokio driver for the session coordinator.
//!
//! The coordinator is pure; this module owns the I/O around it:
//!
//! ```text
//!   idle watcher ──┐
//!   refresh loop ──┼──▶ dispatch(event) ──▶ coordinator.handle ──▶ actions
//!   probe loop ────┤          ▲                                      │
//!   UI / gateway ──┘          └──── completion event ◀── SessionApi ◀┘
//! ```
//!
//! The coordinator lock is held only while an event is handled; network
//! calls run with the lock released. Actions from one event execute in
//! order, and each action's completion is handled before the next action
//! starts, so `NotifyActivity` always lands before the `Refresh` that
//! follows it.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicBool, Ordering},
    },
};

use medsession_core::{
    AccessToken, ActivitySignal, CredentialStore, DurableStorage, Environment, Epoch,
    RefreshError, RefreshOrigin, SessionAction, SessionApi, SessionConfig, SessionCoordinator,
    SessionError, SessionEvent, SessionSnapshot,
};
use tokio::{
    sync::{Mutex, Notify, watch},
    task::JoinHandle,
};

use crate::error::ClientError;

/// Result of an on-demand refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New token stored (or unchanged).
    Refreshed,
    /// Backend refused; `SessionExpired` has already expired the session.
    Rejected(RefreshError),
    /// No active session to refresh.
    NoSession,
}

struct Shared<E: Environment, A, S> {
    env: E,
    api: A,
    config: SessionConfig,
    coordinator: Mutex<SessionCoordinator<E, S>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    shutdown_tx: watch::Sender<bool>,
    idle_wake: Notify,
    stopped: AtomicBool,
}

/// Cloneable handle to a running session.
///
/// Every operation goes through the coordinator; the handle itself holds no
/// session state.
pub struct SessionHandle<E: Environment, A, S> {
    shared: Arc<Shared<E, A, S>>,
}

impl<E: Environment, A, S> Clone for SessionHandle<E, A, S> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

/// Owns the background tasks driving a [`SessionHandle`].
///
/// Dropping the runtime aborts its tasks; [`stop`](Self::stop) additionally
/// stops the coordinator.
pub struct SessionRuntime<E: Environment, A, S> {
    handle: SessionHandle<E, A, S>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl<E, A, S> SessionRuntime<E, A, S>
where
    E: Environment,
    A: SessionApi,
    S: DurableStorage + 'static,
{
    /// Build a runtime around a loaded credential store.
    ///
    /// A persisted credential resumes the session; nothing runs until
    /// [`start`](Self::start).
    pub fn new(
        env: E,
        api: A,
        credentials: CredentialStore<S>,
        config: SessionConfig,
    ) -> Result<Self, ClientError> {
        let coordinator = SessionCoordinator::new(env.clone(), config, credentials)?;
        let (snapshot_tx, _) = watch::channel(coordinator.snapshot());
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            env,
            api,
            config,
            coordinator: Mutex::new(coordinator),
            snapshot_tx,
            shutdown_tx,
            idle_wake: Notify::new(),
            stopped: AtomicBool::new(false),
        });

        Ok(Self { handle: SessionHandle { shared }, tasks: StdMutex::new(Vec::new()) })
    }

    /// Spawn the idle watcher, proactive refresh loop and idle-probe loop.
    ///
    /// Calling `start` on a started or stopped runtime does nothing.
    pub fn start(&self) {
        let shared = &self.handle.shared;
        if shared.stopped.load(Ordering::Acquire) {
            return;
        }

        let Ok(mut tasks) = self.tasks.lock() else {
            tracing::error!("Task list poisoned, runtime not started");
            return;
        };
        if !tasks.is_empty() {
            return;
        }

        let SessionConfig { refresh_interval, probe_interval, .. } = shared.config;

        tasks.push(tokio::spawn(Arc::clone(shared).idle_watcher()));
        tasks.push(tokio::spawn(
            Arc::clone(shared).ticker(refresh_interval, || SessionEvent::RefreshDue),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(shared).ticker(probe_interval, || SessionEvent::ProbeDue),
        ));

        tracing::debug!(?refresh_interval, ?probe_interval, "Session runtime started");
    }

    /// Cloneable handle for the UI and the request gateway.
    pub fn handle(&self) -> SessionHandle<E, A, S> {
        self.handle.clone()
    }

    /// Stop every loop and the coordinator. Idempotent.
    pub async fn stop(&self) {
        let shared = &self.handle.shared;
        if shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = shared.shutdown_tx.send(true);
        self.abort_tasks();
        if let Err(e) = shared.apply(SessionEvent::Shutdown).await {
            tracing::warn!(error = %e, "Coordinator shutdown failed");
        }

        tracing::debug!("Session runtime stopped");
    }

    /// Number of live background tasks.
    pub fn running_tasks(&self) -> usize {
        self.tasks
            .lock()
            .map(|tasks| tasks.iter().filter(|t| !t.is_finished()).count())
            .unwrap_or(0)
    }

    fn abort_tasks(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl<E: Environment, A, S> Drop for SessionRuntime<E, A, S> {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl<E, A, S> std::ops::Deref for SessionRuntime<E, A, S>
where
    E: Environment,
{
    type Target = SessionHandle<E, A, S>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<E, A, S> SessionHandle<E, A, S>
where
    E: Environment,
    A: SessionApi,
    S: DurableStorage + 'static,
{
    /// Authenticate and start a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionSnapshot, ClientError> {
        if self.is_stopped() {
            return Err(ClientError::Stopped);
        }

        let grant = self.shared.api.login(email, password).await?;
        self.shared
            .dispatch(SessionEvent::LoggedIn {
                user: grant.user,
                access_token: AccessToken::new(grant.access_token),
            })
            .await?;
        self.shared.idle_wake.notify_one();

        Ok(self.snapshot())
    }

    /// End the session: best-effort backend logout, then local clear.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.shared.dispatch(SessionEvent::LogoutRequested).await?;
        Ok(())
    }

    /// Report a user or network interaction.
    pub async fn record_activity(&self, signal: ActivitySignal) {
        self.shared.dispatch_logged(SessionEvent::Activity { signal }).await;
    }

    /// Refresh immediately, outside the proactive schedule.
    pub async fn refresh_now(&self, origin: RefreshOrigin) -> RefreshOutcome {
        let actions = match self.shared.apply(SessionEvent::RefreshRequested { origin }).await {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!(error = %e, "Refresh request rejected");
                return RefreshOutcome::NoSession;
            },
        };

        let Some(SessionAction::Refresh { epoch, origin, access_token }) = actions.into_iter().next()
        else {
            return RefreshOutcome::NoSession;
        };

        let result = self.shared.api.refresh(Some(access_token.as_str())).await;
        let outcome = match &result {
            Ok(_) => RefreshOutcome::Refreshed,
            Err(e) => RefreshOutcome::Rejected(e.clone()),
        };

        self.shared
            .dispatch_logged(SessionEvent::RefreshCompleted {
                epoch,
                origin,
                result: result.map(AccessToken::from),
            })
            .await;

        outcome
    }

    /// Abandon the session after an unrecoverable 401.
    pub async fn force_logout(&self, epoch: Epoch, expired: bool) {
        self.shared.dispatch_logged(SessionEvent::ForcedLogout { epoch, expired }).await;
    }

    /// Current token and the epoch it belongs to.
    pub async fn current_token(&self) -> Option<(Epoch, String)> {
        let coordinator = self.shared.coordinator.lock().await;
        coordinator.access_token().map(|token| (coordinator.epoch(), token.to_string()))
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Observe snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Whether the runtime has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }
}

impl<E, A, S> Shared<E, A, S>
where
    E: Environment,
    A: SessionApi,
    S: DurableStorage + 'static,
{
    /// Handle one event under the lock and publish the resulting snapshot.
    async fn apply(&self, event: SessionEvent) -> Result<Vec<SessionAction>, SessionError> {
        let mut coordinator = self.coordinator.lock().await;
        let actions = coordinator.handle(event)?;

        let snapshot = coordinator.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        Ok(actions)
    }

    /// Handle an event and run every action it leads to.
    async fn dispatch(&self, event: SessionEvent) -> Result<(), SessionError> {
        let mut pending: VecDeque<SessionAction> = self.apply(event).await?.into();

        while let Some(action) = pending.pop_front() {
            let Some(completion) = self.perform(action).await else {
                continue;
            };

            let follow_up = self.apply(completion).await?;
            for action in follow_up.into_iter().rev() {
                pending.push_front(action);
            }
        }

        Ok(())
    }

    async fn dispatch_logged(&self, event: SessionEvent) {
        if let Err(e) = self.dispatch(event).await {
            tracing::warn!(error = %e, "Session event failed");
        }
    }

    /// Execute one action; returns the completion event to feed back.
    async fn perform(&self, action: SessionAction) -> Option<SessionEvent> {
        match action {
            SessionAction::NotifyActivity { epoch, access_token } => {
                let result = self.api.notify_activity(access_token.as_str()).await;
                Some(SessionEvent::ActivityAcknowledged { epoch, result })
            },

            SessionAction::Refresh { epoch, origin, access_token } => {
                let result = self.api.refresh(Some(access_token.as_str())).await;
                Some(SessionEvent::RefreshCompleted {
                    epoch,
                    origin,
                    result: result.map(AccessToken::from),
                })
            },

            SessionAction::CallLogout { epoch, access_token } => {
                if let Err(e) = self.api.logout(access_token.as_str()).await {
                    tracing::warn!(error = %e, "Backend logout failed, clearing locally");
                }
                Some(SessionEvent::LogoutFinished { epoch })
            },

            SessionAction::SessionExpired { reason } => {
                tracing::warn!(?reason, "Session expired, interaction blocked until login");
                None
            },

            SessionAction::SessionCleared => None,
        }
    }

    async fn idle_watcher(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();

        while !*shutdown.borrow() {
            let wait = self.coordinator.lock().await.time_to_idle();

            match wait {
                Some(wait) => tokio::select! {
                    () = self.env.sleep(wait) => {
                        self.dispatch_logged(SessionEvent::IdleCheck).await;
                    },
                    () = self.idle_wake.notified() => {},
                    _ = shutdown.changed() => break,
                },
                None => tokio::select! {
                    () = self.idle_wake.notified() => {},
                    _ = shutdown.changed() => break,
                },
            }
        }
    }

    async fn ticker(
        self: Arc<Self>,
        period: std::time::Duration,
        event: impl Fn() -> SessionEvent + Send + 'static,
    ) {
        let mut shutdown = self.shutdown_tx.subscribe();

        while !*shutdown.borrow() {
            tokio::select! {
                () = self.env.sleep(period) => self.dispatch_logged(event()).await,
                _ = shutdown.changed() => break,
            }
        }
    }
}
