//! Reference model for model-based testing.
//!
//! The model captures the session lifecycle rules without epochs, guards or
//! storage. It is the oracle the real coordinator is compared against.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Rules not mechanism: Captures WHAT, not HOW
//! - Deterministic: Same inputs produce same outputs

pub mod operation;
mod session;

pub use operation::{ModelPhase, ObservableState, Operation, RefreshReply};
pub use session::ModelSession;
