//! Production runtime for the medsession coordinator.
//!
//! This crate wires the Sans-IO core to real I/O:
//!
//! ```text
//! medsession-client
//!   ├─ SystemEnv          (tokio clock Environment)
//!   ├─ ReqwestTransport   (HTTP via reqwest)
//!   ├─ HttpSessionApi     (SessionApi over a Transport)
//!   ├─ FileStorage        (DurableStorage in a JSON file)
//!   ├─ SessionRuntime     (idle watcher + refresh loop + probe loop)
//!   ├─ Gateway            (authenticated requests, 401 recovery)
//!   └─ RuntimeConfig      (TOML configuration)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
mod error;
mod file_storage;
mod gateway;
mod http_api;
mod runtime;
mod system_env;
pub mod transport;

pub use config::RuntimeConfig;
pub use error::{ClientError, GatewayError, TransportError};
pub use file_storage::FileStorage;
pub use gateway::{Gateway, SessionControl};
pub use http_api::HttpSessionApi;
use medsession_core::CredentialStore;
pub use runtime::{RefreshOutcome, SessionHandle, SessionRuntime};
pub use system_env::SystemEnv;
pub use transport::{ApiRequest, ApiResponse, Method, ReqwestTransport, Transport};

/// Runtime wired to the production stack.
pub type ProductionRuntime = SessionRuntime<SystemEnv, HttpSessionApi<ReqwestTransport>, FileStorage>;

/// Gateway wired to the production stack.
pub type ProductionGateway = Gateway<
    ReqwestTransport,
    SessionHandle<SystemEnv, HttpSessionApi<ReqwestTransport>, FileStorage>,
>;

/// Build the production runtime and gateway from a configuration.
///
/// The persisted credential (if any) is restored; call
/// [`SessionRuntime::start`] to begin the loops.
pub fn connect(config: &RuntimeConfig) -> Result<(ProductionRuntime, ProductionGateway), ClientError> {
    config.validate()?;

    let transport = ReqwestTransport::new(&config.base_url, config.request_timeout)?;
    let storage = FileStorage::open(&config.storage_path)?;
    let credentials =
        CredentialStore::load(storage, config.storage_keys.clone(), config.preserved_keys.clone());

    let api = HttpSessionApi::new(transport.clone(), config.endpoints.clone());
    let runtime = SessionRuntime::new(SystemEnv::new(), api, credentials, config.session)?;
    let gateway = Gateway::new(transport, runtime.handle(), config.endpoints.clone());

    Ok((runtime, gateway))
}
