//! Runtime optimization subsystems for a long-running LLM agent process.
//!
//! Four independent components, all consumed by an external orchestrator:
//! - [`config::ConfigCache`] - parsed-config caching with mtime/hash invalidation
//! - [`pool::ConnectionPool`] - pooled HTTP clients per LLM provider
//! - [`tools::LazyToolRegistry`] - lazy tool instantiation with usage tracking
//! - [`trajectory::TrajectoryRecorder`] - batched durable execution history
//!
//! No component depends on another. All are plain constructible values owned
//! by the caller; there are no process-wide singletons.

pub mod config;
pub mod core;
pub mod pool;
pub mod providers;
pub mod tools;
pub mod trajectory;

pub use crate::core::{AgentError, AgentResult};
