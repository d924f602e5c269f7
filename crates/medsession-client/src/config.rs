//! Runtime configuration loaded from TOML.
//!
//! ```toml
//! base_url = "https://opd.example.org/api"
//! storage_path = "medsession.json"
//! request_timeout_ms = 10000
//!
//! [session]
//! idle_timeout_ms = 900000
//! probe_interval_ms = 12000
//!
//! [endpoints]
//! refresh = "/session/refresh"
//! ```
//!
//! Every field is optional; omitted values take the defaults below.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use medsession_core::{
    DEFAULT_PRESERVED_KEYS, Endpoints, SessionConfig, StorageKeys, config::duration_ms,
};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the runtime and binary need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Backend base URL; endpoint paths are appended to it.
    pub base_url: String,
    /// JSON file backing durable storage.
    pub storage_path: PathBuf,
    /// Per-request timeout.
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
    /// Backend endpoint paths.
    pub endpoints: Endpoints,
    /// Durable storage keys for the credential.
    pub storage_keys: StorageKeys,
    /// Keys that survive a credential wipe.
    pub preserved_keys: Vec<String>,
    /// Session timer cadences.
    pub session: SessionConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            storage_path: PathBuf::from("medsession.json"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            endpoints: Endpoints::default(),
            storage_keys: StorageKeys::default(),
            preserved_keys: DEFAULT_PRESERVED_KEYS.iter().map(|k| (*k).to_string()).collect(),
            session: SessionConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ClientError> {
        let config: Self = toml::from_str(text).map_err(|e| ClientError::ConfigFile {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            },
            Err(e) => {
                return Err(ClientError::ConfigFile { path: path.to_path_buf(), reason: e.to_string() });
            },
        };

        Self::from_toml(&text).map_err(|e| match e {
            ClientError::ConfigFile { reason, .. } => {
                ClientError::ConfigFile { path: path.to_path_buf(), reason }
            },
            other => other,
        })
    }

    /// Reject configurations the runtime cannot run with.
    pub fn validate(&self) -> Result<(), ClientError> {
        self.session.validate()?;
        self.endpoints.validate()?;
        if self.request_timeout.is_zero() {
            return Err(medsession_core::ConfigError::ZeroDuration { field: "request_timeout" }.into());
        }
        Ok(())
    }
}
