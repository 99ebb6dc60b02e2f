//! Configuration schema and caching.
//!
//! The schema here mirrors the agent's JSON configuration file. The cache in
//! [`cache`] keeps parsed [`Config`] snapshots keyed by file path and
//! invalidates them on file change.

use crate::core::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub mod cache;

pub use cache::{CacheEntryInfo, CacheStats, ConfigCache, OptimizeReport};

/// Per-provider model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub model: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    #[serde(default)]
    pub parallel_tool_calls: bool,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub candidate_count: Option<u32>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
}

/// Optional secondary model used for step summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryModelConfig {
    pub model_provider: String,
    pub model_name: String,
}

/// Parsed agent configuration
///
/// The on-disk format beyond these fields is owned by the orchestrator; the
/// cache only guarantees these survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub default_provider: String,
    pub max_steps: u32,
    #[serde(default)]
    pub enable_summary: bool,
    #[serde(default)]
    pub model_providers: HashMap<String, ModelParameters>,
    #[serde(default)]
    pub summary_model: Option<SummaryModelConfig>,
}

impl Config {
    /// Load and parse a configuration file from disk
    pub fn from_file(path: impl AsRef<Path>) -> AgentResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            AgentError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
