//! Coordinator error types.

use thiserror::Error;

use crate::{activity::ActivityError, config::ConfigError, credential::CredentialError};

/// Errors from [`SessionCoordinator`](crate::SessionCoordinator) operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Activity monitor refused to start.
    #[error("activity monitor: {0}")]
    Activity(#[from] ActivityError),

    /// Credential mutation failed.
    #[error("credential: {0}")]
    Credential(#[from] CredentialError),
}

impl SessionError {
    /// Returns true if the event was rejected without changing state.
    ///
    /// Storage failures are the exception: the in-memory credential has
    /// already been updated and only persistence was lost.
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::Config(_) | Self::Activity(_) => true,
            Self::Credential(CredentialError::Storage(_)) => false,
            Self::Credential(_) => true,
        }
    }
}
