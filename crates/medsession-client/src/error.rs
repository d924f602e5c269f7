//! Client error types.

use std::path::PathBuf;

use medsession_core::{
    ConfigError, LoginError, SessionError, StorageError, recovery::UNAUTHORIZED,
};
use thiserror::Error;

use crate::transport::ApiResponse;

/// Failure to get any HTTP response at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection could not be established.
    #[error("connection failed: {reason}")]
    Connect {
        /// Underlying error.
        reason: String,
    },

    /// Base URL or path could not form a valid URL.
    #[error("invalid url: {reason}")]
    InvalidUrl {
        /// Underlying error.
        reason: String,
    },

    /// Any other failure while sending or reading the response.
    #[error("request failed: {reason}")]
    Request {
        /// Underlying error.
        reason: String,
    },
}

impl TransportError {
    /// Returns true if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect { .. } | Self::Request { .. } => true,
            Self::InvalidUrl { .. } => false,
        }
    }
}

/// Errors from [`Gateway::send`](crate::Gateway::send).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request never got a response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The 401 could not be recovered; the original response is attached.
    #[error("unauthorized (session expired: {expired})")]
    Unauthorized {
        /// The original 401 response.
        response: ApiResponse,
        /// Whether the session was expired as a result.
        expired: bool,
    },
}

impl GatewayError {
    /// HTTP status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(_) => None,
            Self::Unauthorized { .. } => Some(UNAUTHORIZED),
        }
    }

    /// Returns true if the session is gone and the user must log in again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Errors from the runtime and binary.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration values rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Configuration file unreadable or malformed.
    #[error("config file {path}: {reason}")]
    ConfigFile {
        /// File that failed.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Coordinator rejected an event.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Login failed.
    #[error("login failed: {0}")]
    Login(#[from] LoginError),

    /// Durable storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// HTTP transport could not be built.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Runtime has been stopped.
    #[error("session runtime stopped")]
    Stopped,
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable without operator
    /// action).
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::ConfigFile { .. } | Self::Stopped => true,
            Self::Session(e) => e.is_rejection(),
            Self::Transport(e) => !e.is_transient(),
            Self::Login(_) | Self::Storage(_) => false,
        }
    }
}
