//! Pooled HTTP clients for LLM providers.
//!
//! One `reqwest::Client` per (provider, endpoint) key, created at most once
//! under a registry-wide lock and reused by every subsequent caller. Provider
//! identity selects the credential headers and timeout profile.

use crate::core::{AgentError, AgentResult};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;

/// Keep pooled connections alive between requests
const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

/// Parameters for acquiring a pooled client
#[derive(Debug, Clone)]
pub struct ClientSpec {
    pub provider: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Total request timeout, used when the provider has no profile of its own
    pub timeout_secs: u64,
    /// Maximum idle pooled connections per host
    pub max_connections: usize,
}

impl ClientSpec {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            base_url: None,
            api_key: None,
            timeout_secs: 30,
            max_connections: 10,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    fn pool_key(&self) -> String {
        format!(
            "{}:{}",
            self.provider,
            self.base_url.as_deref().unwrap_or("default")
        )
    }
}

/// Request metrics across all pooled clients
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub total_requests: u64,
    pub connection_reuse_count: u64,
    pub total_request_time: Duration,
}

impl PoolMetrics {
    pub fn reuse_rate_percent(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.connection_reuse_count as f64 / self.total_requests as f64 * 100.0
        }
    }

    pub fn average_request_time(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            self.total_request_time / self.total_requests as u32
        }
    }
}

/// Registry-level statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub pooled_clients: usize,
    pub clients_created: u64,
    pub keys: Vec<String>,
}

/// Get-or-create registry of HTTP clients keyed by provider and endpoint.
///
/// The check-construct-register sequence runs under a single async lock, so
/// concurrent first-access for the same key constructs exactly one client.
/// Construction failures propagate to the caller; the pool never retries.
pub struct ConnectionPool {
    clients: Mutex<HashMap<String, Client>>,
    clients_created: StdMutex<u64>,
    metrics: StdMutex<PoolMetrics>,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            clients_created: StdMutex::new(0),
            metrics: StdMutex::new(PoolMetrics::default()),
        }
    }

    /// Get the pooled client for the spec's key, constructing it on first use.
    pub async fn acquire(&self, spec: &ClientSpec) -> AgentResult<Client> {
        let key = spec.pool_key();
        let mut clients = self.clients.lock().await;

        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_client(spec)?;
        clients.insert(key.clone(), client.clone());
        *self.clients_created.lock().unwrap() += 1;
        log::debug!("Created pooled HTTP client for {}", key);
        Ok(client)
    }

    /// Drop every registered client. Subsequent acquires rebuild fresh.
    pub async fn shutdown(&self) {
        let mut clients = self.clients.lock().await;
        let count = clients.len();
        clients.clear();
        log::info!("Connection pool shut down, {} clients dropped", count);
    }

    /// Record one outbound request for metrics
    pub fn record_request(&self, duration: Duration, connection_reused: bool) {
        let mut metrics = self.metrics.lock().unwrap();
        metrics.total_requests += 1;
        metrics.total_request_time += duration;
        if connection_reused {
            metrics.connection_reuse_count += 1;
        }
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.metrics.lock().unwrap().clone()
    }

    pub async fn stats(&self) -> PoolStats {
        let clients = self.clients.lock().await;
        let mut keys: Vec<String> = clients.keys().cloned().collect();
        keys.sort();
        PoolStats {
            pooled_clients: clients.len(),
            clients_created: *self.clients_created.lock().unwrap(),
            keys,
        }
    }
}

/// Per-provider connect/total timeout profile
fn timeout_profile(provider: &str, fallback_secs: u64) -> (Duration, Duration) {
    match provider {
        // Longer read timeout for streaming responses
        "openai" => (Duration::from_secs(10), Duration::from_secs(60)),
        // Anthropic can be slower on long generations
        "anthropic" => (Duration::from_secs(10), Duration::from_secs(120)),
        "google" => (Duration::from_secs(10), Duration::from_secs(90)),
        _ => (
            Duration::from_secs(10),
            Duration::from_secs(fallback_secs),
        ),
    }
}

/// Credential headers for the provider's wire contract
fn auth_headers(provider: &str, api_key: Option<&str>) -> AgentResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let Some(api_key) = api_key else {
        return Ok(headers);
    };

    let header_value = |value: &str| {
        HeaderValue::from_str(value)
            .map_err(|e| AgentError::Pool(format!("Invalid credential header value: {}", e)))
    };

    match provider {
        "openai" | "google" => {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", api_key))?);
        }
        "anthropic" => {
            headers.insert("x-api-key", header_value(api_key)?);
            headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        }
        _ => {}
    }

    Ok(headers)
}

fn build_client(spec: &ClientSpec) -> AgentResult<Client> {
    let (connect_timeout, total_timeout) = timeout_profile(&spec.provider, spec.timeout_secs);
    let headers = auth_headers(&spec.provider, spec.api_key.as_deref())?;

    Client::builder()
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .timeout(total_timeout)
        .pool_max_idle_per_host(spec.max_connections)
        .pool_idle_timeout(KEEPALIVE_EXPIRY)
        .build()
        .map_err(|e| {
            AgentError::Pool(format!(
                "Failed to create HTTP client for {}: {}",
                spec.provider, e
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sequential_acquire_returns_pooled_client() {
        let pool = ConnectionPool::new();
        let spec = ClientSpec::new("openai").with_api_key("sk-test");

        pool.acquire(&spec).await.unwrap();
        pool.acquire(&spec).await.unwrap();

        let stats = pool.stats().await;
        assert_eq!(stats.pooled_clients, 1);
        assert_eq!(stats.clients_created, 1);
        assert_eq!(stats.keys, vec!["openai:default".to_string()]);
    }

    #[tokio::test]
    async fn test_distinct_endpoints_get_distinct_clients() {
        let pool = ConnectionPool::new();
        let default_spec = ClientSpec::new("openai");
        let proxied = ClientSpec::new("openai").with_base_url("https://proxy.internal/v1");

        pool.acquire(&default_spec).await.unwrap();
        pool.acquire(&proxied).await.unwrap();

        let stats = pool.stats().await;
        assert_eq!(stats.pooled_clients, 2);
        assert_eq!(stats.clients_created, 2);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_constructs_exactly_one_client() {
        let pool = Arc::new(ConnectionPool::new());
        let mut handles = Vec::new();

        for _ in 0..16 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                let spec = ClientSpec::new("anthropic").with_api_key("sk-test");
                pool.acquire(&spec).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = pool.stats().await;
        assert_eq!(stats.pooled_clients, 1);
        assert_eq!(stats.clients_created, 1);
    }

    #[tokio::test]
    async fn test_shutdown_clears_and_rebuilds() {
        let pool = ConnectionPool::new();
        let spec = ClientSpec::new("google");

        pool.acquire(&spec).await.unwrap();
        pool.shutdown().await;
        assert_eq!(pool.stats().await.pooled_clients, 0);

        pool.acquire(&spec).await.unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.pooled_clients, 1);
        assert_eq!(stats.clients_created, 2);
    }

    #[test]
    fn test_metrics_reuse_rate() {
        let pool = ConnectionPool::new();
        pool.record_request(Duration::from_millis(100), false);
        pool.record_request(Duration::from_millis(300), true);

        let metrics = pool.metrics();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.connection_reuse_count, 1);
        assert!((metrics.reuse_rate_percent() - 50.0).abs() < f64::EPSILON);
        assert_eq!(metrics.average_request_time(), Duration::from_millis(200));
    }
}
