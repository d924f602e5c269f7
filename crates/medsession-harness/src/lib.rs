//! Deterministic simulation harness for medsession testing.
//!
//! - [`SimEnv`]: virtual clock `Environment`; time moves only when told to
//! - [`MockSessionApi`], [`MockTransport`]: scripted backend doubles with
//!   call logs
//! - [`ModelSession`]: reference model of the session lifecycle
//! - [`SimSession`]: the real coordinator driven by model operations
//! - [`ActivityScript`]: seeded operation sequences
//!
//! # Model-Based Testing
//!
//! Operations are applied to both [`ModelSession`] and [`SimSession`], and
//! their observable states are compared after every step.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod mock_api;
pub mod mock_transport;
pub mod model;
pub mod script;
pub mod sim_env;
pub mod sim_session;

pub use mock_api::{ApiCall, MockSessionApi, test_user};
pub use mock_transport::{MockTransport, SeenRequest};
pub use model::{ModelPhase, ModelSession, ObservableState, Operation, RefreshReply};
pub use script::ActivityScript;
pub use sim_env::{SimEnv, SimInstant};
pub use sim_session::{SimCoordinator, SimSession};
