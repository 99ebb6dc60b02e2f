//! Lazy tool registry and forwarding proxy.
//!
//! Tools are registered as factories and constructed at most once per name,
//! on first use, under a single lock. Construction cost and access counts are
//! tracked so rarely used instances can be evicted again.

use super::{Tool, ToolCall, ToolResult};
use crate::core::{AgentError, AgentResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};

/// Constructs a tool from its name and a shared construction context
/// (typically the model provider tag).
pub type ToolFactory = Box<dyn Fn(&str, &str) -> Box<dyn Tool> + Send + Sync>;

struct RegistryState {
    factories: HashMap<String, ToolFactory>,
    instances: HashMap<String, Arc<dyn Tool>>,
    load_times: HashMap<String, Duration>,
    access_counts: HashMap<String, u64>,
}

/// Per-tool loading diagnostics
#[derive(Debug, Clone)]
pub struct ToolLoadStat {
    pub name: String,
    pub load_time_ms: f64,
    pub access_count: u64,
}

/// Aggregate loading statistics
#[derive(Debug, Clone)]
pub struct ToolLoadingStats {
    pub instantiated_tools: usize,
    pub available_tools: usize,
    pub total_load_time_ms: f64,
    pub average_load_time_ms: f64,
    pub most_used_tool: Option<(String, u64)>,
    pub tools: Vec<ToolLoadStat>,
}

/// Registry of lazily constructed tool instances.
///
/// The check-construct-register sequence runs under one lock, so concurrent
/// callers never construct the same tool twice. A constructed instance is
/// returned unchanged by every later resolution until it is evicted.
pub struct LazyToolRegistry {
    context: String,
    state: Mutex<RegistryState>,
}

impl LazyToolRegistry {
    /// Create a registry; `context` is passed to every factory
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            state: Mutex::new(RegistryState {
                factories: HashMap::new(),
                instances: HashMap::new(),
                load_times: HashMap::new(),
                access_counts: HashMap::new(),
            }),
        }
    }

    /// Register a factory for a tool name
    pub fn register(&self, name: impl Into<String>, factory: ToolFactory) {
        let mut state = self.state.lock().unwrap();
        state.factories.insert(name.into(), factory);
    }

    /// Resolve a tool, constructing it on first use.
    ///
    /// Repeat calls return the same instance and bump its access counter.
    pub fn get(&self, name: &str) -> AgentResult<Arc<dyn Tool>> {
        let mut state = self.state.lock().unwrap();

        if let Some(tool) = state.instances.get(name).cloned() {
            *state.access_counts.entry(name.to_string()).or_insert(0) += 1;
            return Ok(tool);
        }

        let Some(factory) = state.factories.get(name) else {
            let mut available: Vec<String> = state.factories.keys().cloned().collect();
            available.sort();
            return Err(AgentError::UnknownTool {
                name: name.to_string(),
                available,
            });
        };

        let started = Instant::now();
        let tool: Arc<dyn Tool> = Arc::from(factory(name, &self.context));
        let load_time = started.elapsed();

        state.instances.insert(name.to_string(), tool.clone());
        state.load_times.insert(name.to_string(), load_time);
        state.access_counts.insert(name.to_string(), 1);
        log::debug!(
            "Instantiated tool '{}' in {:.2}ms",
            name,
            load_time.as_secs_f64() * 1000.0
        );
        Ok(tool)
    }

    /// Registered tool names, sorted
    pub fn available_tools(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of already-constructed instances, sorted
    pub fn loaded_tools(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.instances.keys().cloned().collect();
        names.sort();
        names
    }

    /// Eagerly resolve a batch of tools to warm frequently used entries
    pub fn preload(&self, names: &[&str]) -> AgentResult<()> {
        for name in names {
            self.get(name)?;
        }
        Ok(())
    }

    /// Drop instances accessed fewer than `min_access_count` times.
    ///
    /// Returns the number removed. Evicted tools are re-constructed on the
    /// next resolution, trading memory for future construction cost.
    pub fn evict_unused(&self, min_access_count: u64) -> usize {
        let mut state = self.state.lock().unwrap();
        let unused: Vec<String> = state
            .access_counts
            .iter()
            .filter(|(name, count)| **count < min_access_count && state.instances.contains_key(*name))
            .map(|(name, _)| name.clone())
            .collect();

        for name in &unused {
            state.instances.remove(name);
            state.access_counts.remove(name);
            state.load_times.remove(name);
        }

        unused.len()
    }

    /// Loading performance statistics
    pub fn loading_stats(&self) -> ToolLoadingStats {
        let state = self.state.lock().unwrap();
        let total: Duration = state.load_times.values().sum();
        let total_ms = total.as_secs_f64() * 1000.0;
        let average_ms = if state.load_times.is_empty() {
            0.0
        } else {
            total_ms / state.load_times.len() as f64
        };

        let most_used = state
            .access_counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(name, count)| (name.clone(), *count));

        let mut tools: Vec<ToolLoadStat> = state
            .load_times
            .iter()
            .map(|(name, load_time)| ToolLoadStat {
                name: name.clone(),
                load_time_ms: load_time.as_secs_f64() * 1000.0,
                access_count: state.access_counts.get(name).copied().unwrap_or(0),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));

        ToolLoadingStats {
            instantiated_tools: state.instances.len(),
            available_tools: state.factories.len(),
            total_load_time_ms: total_ms,
            average_load_time_ms: average_ms,
            most_used_tool: most_used,
            tools,
        }
    }
}

/// Forwarding placeholder for a registry tool.
///
/// Answers `name()` without constructing anything; every other operation
/// resolves the real instance through the registry on first call and
/// forwards to it from then on. Does not own the instance or the registry.
pub struct LazyToolProxy {
    name: String,
    registry: Weak<LazyToolRegistry>,
    resolved: OnceLock<Arc<dyn Tool>>,
}

impl LazyToolProxy {
    pub fn new(name: impl Into<String>, registry: &Arc<LazyToolRegistry>) -> Self {
        Self {
            name: name.into(),
            registry: Arc::downgrade(registry),
            resolved: OnceLock::new(),
        }
    }

    /// Whether the underlying tool has been constructed yet
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    fn ensure_loaded(&self) -> Option<&Arc<dyn Tool>> {
        if self.resolved.get().is_none() {
            let Some(registry) = self.registry.upgrade() else {
                log::warn!("Lazy tool '{}': owning registry dropped", self.name);
                return None;
            };
            match registry.get(&self.name) {
                Ok(tool) => {
                    // A concurrent resolver may have won; either way the
                    // registry guarantees both Arcs point at one instance.
                    let _ = self.resolved.set(tool);
                }
                Err(e) => {
                    log::warn!("Lazy tool '{}' failed to resolve: {}", self.name, e);
                    return None;
                }
            }
        }
        self.resolved.get()
    }
}

impl Tool for LazyToolProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        self.ensure_loaded().map(|t| t.description()).unwrap_or("")
    }

    fn parameters(&self) -> serde_json::Value {
        self.ensure_loaded()
            .map(|t| t.parameters())
            .unwrap_or_else(|| serde_json::json!({}))
    }

    fn execute(&self, call: &ToolCall) -> ToolResult {
        match self.ensure_loaded() {
            Some(tool) => tool.execute(call),
            None => ToolResult::failure(
                call.call_id.clone(),
                format!("Tool '{}' is unavailable", self.name),
            ),
        }
    }
}

/// Build the full placeholder collection for a set of tool names.
///
/// Cheap: nothing is constructed until a proxy is genuinely used.
pub fn proxies_for(registry: &Arc<LazyToolRegistry>, names: &[&str]) -> Vec<LazyToolProxy> {
    names
        .iter()
        .map(|name| LazyToolProxy::new(*name, registry))
        .collect()
}
