//! Token Refresh Client contract.
//!
//! [`SessionApi`] is the seam between the coordinator and the backend. The
//! production implementation speaks HTTP; tests script it. Implementations
//! translate every failure into the small [`RefreshError`] taxonomy the
//! coordinator branches on, and never touch the credential store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::UserProfile;

/// Error `code` the backend uses for an expired session.
pub const SESSION_EXPIRED_CODE: &str = "SESSION_EXPIRED";

/// Non-standard "login time-out" status some proxies return.
pub const LOGIN_TIMEOUT_STATUS: u16 = 440;

/// Message fragments that mark a session-expired rejection.
const SESSION_EXPIRED_PHRASES: &[&str] = &["session expired", "session has expired"];

/// Failure of a refresh, activity or logout call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// Backend confirmed the session is gone. Authoritative and terminal.
    #[error("session expired")]
    SessionExpired,

    /// Transport failed before a response arrived.
    #[error("network error: {reason}")]
    Network {
        /// Description of the transport failure.
        reason: String,
    },

    /// Any other rejection or malformed response.
    #[error("unexpected refresh failure: {reason}")]
    Unknown {
        /// Status and message, for diagnostics.
        reason: String,
    },
}

impl RefreshError {
    /// Returns true if the session cannot be recovered by retrying.
    ///
    /// Only `SessionExpired` is terminal. Everything else is retried on the
    /// next scheduled tick, never immediately.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

/// Failure of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    /// Backend rejected the credentials.
    #[error("invalid credentials: {reason}")]
    Rejected {
        /// Backend message.
        reason: String,
    },

    /// Transport failed before a response arrived.
    #[error("network error: {reason}")]
    Network {
        /// Description of the transport failure.
        reason: String,
    },

    /// Response could not be interpreted.
    #[error("unexpected login response: {reason}")]
    Unknown {
        /// Details for diagnostics.
        reason: String,
    },
}

/// Result of a successful login.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginGrant {
    /// Fresh access token.
    pub access_token: String,
    /// Logged-in user.
    pub user: UserProfile,
}

impl std::fmt::Debug for LoginGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginGrant")
            .field("access_token", &format!("<redacted {} bytes>", self.access_token.len()))
            .field("user", &self.user)
            .finish()
    }
}

/// `{ success, data }` envelope used by every session endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    /// Whether the backend accepted the call.
    #[serde(default)]
    pub success: bool,
    /// Payload on success.
    pub data: Option<T>,
    /// Optional error code.
    pub code: Option<String>,
    /// Optional human-readable message.
    pub message: Option<String>,
}

/// Payload of `POST /session/refresh`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    /// New access token.
    pub access_token: String,
}

/// JSON error body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub code: Option<String>,
    /// Human-readable message.
    pub message: Option<String>,
    /// Alternative message field used by some handlers.
    pub error: Option<String>,
}

impl ErrorBody {
    /// Parse a raw body; anything unparseable is an empty body.
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// Whether this body marks the session as expired.
    pub fn is_session_expired(&self) -> bool {
        let code_matches =
            self.code.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(SESSION_EXPIRED_CODE));

        let message_matches = [&self.message, &self.error].into_iter().flatten().any(|m| {
            let m = m.to_lowercase();
            SESSION_EXPIRED_PHRASES.iter().any(|phrase| m.contains(phrase))
        });

        code_matches || message_matches
    }

    /// Best available description.
    pub fn describe(&self) -> &str {
        self.message.as_deref().or(self.error.as_deref()).or(self.code.as_deref()).unwrap_or("")
    }
}

/// Classify a rejected call by status and body.
///
/// Explicit session-expired markers (code, message, or status 440) yield
/// `SessionExpired`; everything else is `Unknown`. A bare 401 is NOT treated
/// as expiry: only the backend's explicit signal is authoritative.
pub fn classify_rejection(status: u16, body: &[u8]) -> RefreshError {
    let parsed = ErrorBody::parse(body);

    if status == LOGIN_TIMEOUT_STATUS || parsed.is_session_expired() {
        return RefreshError::SessionExpired;
    }

    RefreshError::Unknown { reason: format!("status {status}: {}", parsed.describe()) }
}

/// Backend session operations.
#[async_trait]
pub trait SessionApi: Send + Sync + 'static {
    /// Exchange credentials for a token and profile.
    async fn login(&self, email: &str, password: &str) -> Result<LoginGrant, LoginError>;

    /// Obtain a new access token.
    async fn refresh(&self, access_token: Option<&str>) -> Result<String, RefreshError>;

    /// Tell the backend the user is active. Best effort.
    async fn notify_activity(&self, access_token: &str) -> Result<(), RefreshError>;

    /// End the session server-side. Best effort.
    async fn logout(&self, access_token: &str) -> Result<(), RefreshError>;
}

#[async_trait]
impl<T: SessionApi + ?Sized> SessionApi for std::sync::Arc<T> {
    async fn login(&self, email: &str, password: &str) -> Result<LoginGrant, LoginError> {
        (**self).login(email, password).await
    }

    async fn refresh(&self, access_token: Option<&str>) -> Result<String, RefreshError> {
        (**self).refresh(access_token).await
    }

    async fn notify_activity(&self, access_token: &str) -> Result<(), RefreshError> {
        (**self).notify_activity(access_token).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), RefreshError> {
        (**self).logout(access_token).await
    }
}
