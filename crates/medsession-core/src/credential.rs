//! Credential Store
//!
//! Single source of truth for who is logged in and with which access token,
//! durable across restarts.
//!
//! ## Responsibilities
//!
//! - Writes: only [`CredentialStore::set_credential`],
//!   [`CredentialStore::update_token`] and
//!   [`CredentialStore::clear_credential`] mutate the credential
//! - Persistence: token and user profile are mirrored to [`DurableStorage`]
//! - Cold start: [`CredentialStore::load`] restores a credential only when
//!   both persisted entries are present and readable
//! - Workflow drafts: a named allow-list of keys survives logout

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    role::Role,
    storage::{DurableStorage, StorageError},
};

/// Drafts that must survive a logout.
pub const DEFAULT_PRESERVED_KEYS: &[&str] = &["draft_visit_id", "proforma_draft_step"];

/// Access token in transit between the coordinator and its driver.
///
/// # Security
///
/// - **Debug Redaction**: the `Debug` impl prints only the length so events
///   and actions can be logged with `?`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap the raw token.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken(<redacted {} bytes>)", self.0.len())
    }
}

/// Logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Backend user ID.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Role, normalized on the way in.
    pub role: Role,
}

impl UserProfile {
    /// Copy of this profile with its role normalized.
    pub fn normalized(mut self) -> Self {
        self.role = self.role.normalized();
        self
    }
}

/// Current credential.
///
/// `is_authenticated()` is derived from the two fields, so it can never
/// disagree with them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    user: Option<UserProfile>,
    access_token: Option<String>,
}

impl Credential {
    /// Logged-in user, if any.
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    /// Current access token, if any.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// True iff both user and token are present.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.access_token.is_some()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user.as_ref().map(|u| u.id))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|t| format!("<redacted {} bytes>", t.len())),
            )
            .field("is_authenticated", &self.is_authenticated())
            .finish()
    }
}

/// Storage keys used for the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// Key holding the raw access token.
    pub access_token: String,
    /// Key holding the JSON user profile.
    pub user: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self { access_token: "access_token".to_string(), user: "user".to_string() }
    }
}

/// Errors from credential mutations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Token was empty.
    #[error("access token must not be empty")]
    EmptyToken,

    /// Token update without a logged-in user.
    #[error("no user is logged in")]
    NotAuthenticated,

    /// Persisting failed. The in-memory credential has still been updated.
    #[error("credential storage failed: {0}")]
    Storage(#[from] StorageError),

    /// User profile could not be serialized.
    #[error("user profile encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Owns the credential and its persisted mirror.
pub struct CredentialStore<S> {
    storage: S,
    keys: StorageKeys,
    preserved_keys: Vec<String>,
    credential: Credential,
}

impl<S: DurableStorage> CredentialStore<S> {
    /// Restore from storage.
    ///
    /// A missing entry means "no credential". An unreadable user entry is
    /// deleted and also means "no credential"; it is never returned as an
    /// error. A token without a user (or the reverse) is left in storage but
    /// not treated as authenticated.
    pub fn load(storage: S, keys: StorageKeys, preserved_keys: Vec<String>) -> Self {
        let credential = match read_persisted(&storage, &keys) {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(error = %e, "Persisted credential unreadable, discarding");
                if let Err(e) = storage.remove(&keys.user) {
                    tracing::warn!(error = %e, "Failed to delete corrupt user entry");
                }
                Credential::default()
            },
        };

        Self { storage, keys, preserved_keys, credential }
    }

    /// Current credential.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Logged-in user, if any.
    pub fn user(&self) -> Option<&UserProfile> {
        self.credential.user()
    }

    /// Current access token, if any.
    pub fn access_token(&self) -> Option<&str> {
        self.credential.access_token()
    }

    /// True iff both user and token are present.
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_authenticated()
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Install a new credential after login.
    ///
    /// # Errors
    ///
    /// - `CredentialError::EmptyToken` leaves the credential untouched.
    /// - `CredentialError::Storage` means the in-memory credential was
    ///   installed but not persisted.
    pub fn set_credential(
        &mut self,
        user: UserProfile,
        access_token: impl Into<String>,
    ) -> Result<(), CredentialError> {
        let access_token = access_token.into();
        if access_token.is_empty() {
            return Err(CredentialError::EmptyToken);
        }

        let user = user.normalized();
        let encoded = serde_json::to_string(&user)?;

        self.credential = Credential { user: Some(user), access_token: Some(access_token) };

        self.storage.set(&self.keys.user, &encoded)?;
        if let Some(token) = &self.credential.access_token {
            self.storage.set(&self.keys.access_token, token)?;
        }

        Ok(())
    }

    /// Replace the access token, keeping the user.
    ///
    /// Returns `false` without touching storage when the token is unchanged,
    /// so observers resetting on change are not disturbed.
    pub fn update_token(&mut self, access_token: impl Into<String>) -> Result<bool, CredentialError> {
        let access_token = access_token.into();
        if access_token.is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        if self.credential.user.is_none() {
            return Err(CredentialError::NotAuthenticated);
        }
        if self.credential.access_token.as_deref() == Some(access_token.as_str()) {
            return Ok(false);
        }

        self.storage.set(&self.keys.access_token, &access_token)?;
        self.credential.access_token = Some(access_token);

        Ok(true)
    }

    /// Drop the credential and wipe storage, keeping only the preserved
    /// workflow keys.
    ///
    /// The in-memory credential is cleared first, so a storage failure never
    /// leaves the process authenticated.
    pub fn clear_credential(&mut self) -> Result<(), CredentialError> {
        self.credential = Credential::default();

        let mut preserved = Vec::with_capacity(self.preserved_keys.len());
        for key in &self.preserved_keys {
            if let Some(value) = self.storage.get(key)? {
                preserved.push((key.as_str(), value));
            }
        }

        self.storage.clear()?;

        for (key, value) in preserved {
            self.storage.set(key, &value)?;
        }

        Ok(())
    }
}

fn read_persisted<S: DurableStorage>(
    storage: &S,
    keys: &StorageKeys,
) -> Result<Credential, CredentialError> {
    let token = storage.get(&keys.access_token)?.filter(|t| !t.is_empty());
    let user = storage.get(&keys.user)?;

    let (Some(token), Some(user)) = (token, user) else {
        return Ok(Credential::default());
    };

    let user: UserProfile = serde_json::from_str(&user)?;

    Ok(Credential { user: Some(user.normalized()), access_token: Some(token) })
}
