//! Authenticated request gateway.
//!
//! Every backend call outside the session endpoints goes through
//! [`Gateway::send`]. It counts as network activity, carries the current
//! bearer token, and recovers from a 401 at most once:
//!
//! ```text
//! send ──▶ 401? ──no──▶ response
//!           │
//!           ▼ plan_recovery
//!   ForceLogout ───────────────▶ abandon, Err(Unauthorized)
//!   RefreshAndRetry ─▶ refresh ─▶ ok ──▶ retry once ──▶ response (as-is)
//!                              └▶ err ─▶ abandon, Err(Unauthorized)
//! ```

use async_trait::async_trait;
use medsession_core::{
    ActivitySignal, DurableStorage, Endpoints, Environment, Epoch, RefreshError, RefreshOrigin,
    SessionApi,
    recovery::{Recovery, plan_recovery},
};

use crate::{
    error::GatewayError,
    runtime::{RefreshOutcome, SessionHandle},
    transport::{ApiRequest, ApiResponse, Transport},
};

/// The session operations the gateway depends on.
#[async_trait]
pub trait SessionControl: Send + Sync + 'static {
    /// Current token and its epoch.
    async fn bearer(&self) -> Option<(Epoch, String)>;

    /// Record an interaction.
    async fn note_activity(&self, signal: ActivitySignal);

    /// Refresh on behalf of the gateway.
    async fn refresh_for_retry(&self) -> RefreshOutcome;

    /// Abandon the session.
    async fn abandon(&self, epoch: Epoch, expired: bool);
}

#[async_trait]
impl<E, A, S> SessionControl for SessionHandle<E, A, S>
where
    E: Environment,
    A: SessionApi,
    S: DurableStorage + 'static,
{
    async fn bearer(&self) -> Option<(Epoch, String)> {
        self.current_token().await
    }

    async fn note_activity(&self, signal: ActivitySignal) {
        self.record_activity(signal).await;
    }

    async fn refresh_for_retry(&self) -> RefreshOutcome {
        self.refresh_now(RefreshOrigin::Gateway).await
    }

    async fn abandon(&self, epoch: Epoch, expired: bool) {
        self.force_logout(epoch, expired).await;
    }
}

/// Single chokepoint for authenticated requests.
#[derive(Debug, Clone)]
pub struct Gateway<T, C> {
    transport: T,
    session: C,
    endpoints: Endpoints,
}

impl<T: Transport, C: SessionControl> Gateway<T, C> {
    /// Create a gateway.
    pub fn new(transport: T, session: C, endpoints: Endpoints) -> Self {
        Self { transport, session, endpoints }
    }

    /// Underlying session.
    pub fn session(&self) -> &C {
        &self.session
    }

    /// Send an authenticated request.
    ///
    /// # Errors
    ///
    /// - `GatewayError::Transport` if no response arrived
    /// - `GatewayError::Unauthorized` with the original 401 when recovery
    ///   was impossible or the refresh failed
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, GatewayError> {
        self.session.note_activity(ActivitySignal::Network).await;

        let token = self.session.bearer().await;
        let epoch = token.as_ref().map_or(0, |(epoch, _)| *epoch);
        let bearer = token.as_ref().map(|(_, token)| token.as_str());

        let response = self.transport.execute(request, bearer).await?;

        match plan_recovery(&request.path, response.status, &response.body, &self.endpoints) {
            Recovery::PassThrough => Ok(response),

            Recovery::ForceLogout { expired } => {
                tracing::info!(path = %request.path, expired, "401 not recoverable");
                self.session.abandon(epoch, expired).await;
                Err(GatewayError::Unauthorized { response, expired })
            },

            Recovery::RefreshAndRetry => self.refresh_and_retry(request, epoch, response).await,
        }
    }

    async fn refresh_and_retry(
        &self,
        request: &ApiRequest,
        epoch: Epoch,
        original: ApiResponse,
    ) -> Result<ApiResponse, GatewayError> {
        match self.session.refresh_for_retry().await {
            RefreshOutcome::Refreshed => {
                let bearer = self.session.bearer().await.map(|(_, token)| token);
                tracing::debug!(path = %request.path, "Retrying after refresh");
                Ok(self.transport.execute(request, bearer.as_deref()).await?)
            },

            RefreshOutcome::Rejected(RefreshError::SessionExpired) => {
                // The coordinator has already expired the session.
                Err(GatewayError::Unauthorized { response: original, expired: true })
            },

            RefreshOutcome::Rejected(e) => {
                tracing::info!(path = %request.path, error = %e, "Refresh failed after 401");
                self.session.abandon(epoch, false).await;
                Err(GatewayError::Unauthorized { response: original, expired: false })
            },

            RefreshOutcome::NoSession => {
                Err(GatewayError::Unauthorized { response: original, expired: false })
            },
        }
    }
}
