//! 401 recovery planning for the authenticated request gateway.
//!
//! The gateway performs the I/O; this module only decides what a rejected
//! response means. A request is retried at most once, and never when the
//! failing call was itself a credential exchange.

use crate::{api::ErrorBody, config::Endpoints};

/// HTTP status that triggers recovery.
pub const UNAUTHORIZED: u16 = 401;

/// What the gateway should do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Return the response unchanged.
    PassThrough,
    /// Give up on the session without refreshing.
    ForceLogout {
        /// Backend explicitly reported the session as expired.
        expired: bool,
    },
    /// Refresh the token, then retry the request exactly once.
    RefreshAndRetry,
}

/// Decide how to handle a response to `path`.
///
/// Only a 401 is recovered. An explicit session-expired payload wins over the
/// endpoint check, so an expired session always freezes the UI.
pub fn plan_recovery(path: &str, status: u16, body: &[u8], endpoints: &Endpoints) -> Recovery {
    if status != UNAUTHORIZED {
        return Recovery::PassThrough;
    }

    if ErrorBody::parse(body).is_session_expired() {
        return Recovery::ForceLogout { expired: true };
    }

    if endpoints.is_credential_endpoint(path) {
        return Recovery::ForceLogout { expired: false };
    }

    Recovery::RefreshAndRetry
}
