//! Session lifecycle coordinator core.
//!
//! Action-based, Sans-IO state machines that keep an outpatient frontend's
//! authenticated session consistent:
//!
//! - [`ActivityMonitor`]: tracks user interaction and reports idle/active
//! - [`CredentialStore`]: the single authority over the persisted credential
//! - [`SessionApi`]: backend refresh/activity/logout contract
//! - [`SessionCoordinator`]: composes the above into the session lifecycle
//! - [`plan_recovery`]: decides how the request gateway handles a 401
//!
//! ## Architecture
//!
//! ```text
//! medsession-core
//!   ├─ Environment          (time abstraction)
//!   ├─ SessionConfig        (timer cadences)
//!   ├─ ActivityMonitor      (idle detection)
//!   ├─ CredentialStore      (persisted credential over DurableStorage)
//!   ├─ SessionApi           (backend contract + error classification)
//!   ├─ SessionCoordinator   (events in, actions out)
//!   └─ plan_recovery        (gateway 401 handling)
//! ```
//!
//! Nothing here performs I/O or spawns tasks; `medsession-client` drives the
//! coordinator on tokio.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod activity;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod env;
pub mod error;
pub mod recovery;
pub mod role;
pub mod storage;

pub use activity::{ActivityConfig, ActivityError, ActivityEvent, ActivityMonitor, ActivitySignal, ActivityState};
pub use api::{LoginError, LoginGrant, RefreshError, SessionApi, classify_rejection};
pub use config::{ConfigError, Endpoints, SessionConfig};
pub use coordinator::{
    Epoch, ExpiryGuard, ExpiryReason, RefreshOrigin, SessionAction, SessionCoordinator,
    SessionEvent, SessionPhase, SessionSnapshot, SessionState,
};
pub use credential::{
    AccessToken, Credential, CredentialError, CredentialStore, DEFAULT_PRESERVED_KEYS,
    StorageKeys, UserProfile,
};
pub use env::Environment;
pub use error::SessionError;
pub use recovery::{Recovery, plan_recovery};
pub use role::Role;
pub use storage::{DurableStorage, MemoryStorage, StorageError};
