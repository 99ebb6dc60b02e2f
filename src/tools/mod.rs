//! Tool interface and lazy instantiation.
//!
//! [`Tool`] is the minimal operation set the agent requires of a tool. The
//! registry in [`registry`] constructs tool instances on first use through
//! registered factories and hands out forwarding proxies that defer that
//! cost until a tool is genuinely called.

use serde::{Deserialize, Serialize};

pub mod registry;

pub use registry::{proxies_for, LazyToolProxy, LazyToolRegistry, ToolLoadStat, ToolLoadingStats};

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Outcome of executing a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failure(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Minimal operation set every tool must support
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the accepted arguments
    fn parameters(&self) -> serde_json::Value;
    fn execute(&self, call: &ToolCall) -> ToolResult;
}

impl std::fmt::Debug for dyn Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("name", &self.name()).finish()
    }
}
