//! Core types shared across subsystems.

pub mod error;

pub use error::{AgentError, AgentResult};
